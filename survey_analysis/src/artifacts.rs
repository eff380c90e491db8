//! Temporary chart files produced while rendering a report.

use std::fs;
use std::io;
use std::path::PathBuf;

use log::{debug, warn};

use crate::report::ChartSpec;

/// Turns a chart specification into a file.
///
/// The returned path is owned by the caller, who registers it with an
/// `ArtifactGuard` when the file only lives for the duration of a rendering.
pub trait ChartRenderer {
    fn render(&mut self, chart: &ChartSpec, stem: &str) -> io::Result<PathBuf>;
}

/// Removes the tracked files when dropped, including when the rendering
/// stops early because of an error.
#[derive(Debug, Default)]
pub struct ArtifactGuard {
    paths: Vec<PathBuf>,
}

impl ArtifactGuard {
    pub fn new() -> ArtifactGuard {
        ArtifactGuard::default()
    }

    pub fn track(&mut self, path: PathBuf) -> &PathBuf {
        self.paths.push(path);
        &self.paths[self.paths.len() - 1]
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Renders a chart and tracks the produced file.
    pub fn render_with<R: ChartRenderer>(
        &mut self,
        renderer: &mut R,
        chart: &ChartSpec,
        stem: &str,
    ) -> io::Result<&PathBuf> {
        let path = renderer.render(chart, stem)?;
        Ok(self.track(path))
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        for p in self.paths.drain(..) {
            match fs::remove_file(&p) {
                Ok(()) => debug!("ArtifactGuard::drop: removed {:?}", p),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("ArtifactGuard::drop: could not remove {:?}: {}", p, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ChartKind, ValueAxis};

    struct TextRenderer {
        dir: PathBuf,
    }

    impl ChartRenderer for TextRenderer {
        fn render(&mut self, chart: &ChartSpec, stem: &str) -> io::Result<PathBuf> {
            let path = self.dir.join(format!("{}.txt", stem));
            fs::write(&path, &chart.title)?;
            Ok(path)
        }
    }

    fn chart() -> ChartSpec {
        ChartSpec {
            kind: ChartKind::GroupedBar,
            title: "q by phase".to_string(),
            categories: vec!["a".to_string()],
            series: Vec::new(),
            value_axis: ValueAxis::Count,
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("survey_artifacts_{}_{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn files_are_removed_on_drop() {
        let dir = scratch_dir("drop");
        let mut renderer = TextRenderer { dir: dir.clone() };
        let path = {
            let mut guard = ArtifactGuard::new();
            let p = guard.render_with(&mut renderer, &chart(), "chart_1").unwrap().clone();
            assert!(p.exists());
            assert_eq!(fs::read_to_string(&p).unwrap(), "q by phase");
            p
        };
        assert!(!path.exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn files_are_removed_after_an_early_exit() {
        fn failing(dir: &PathBuf) -> io::Result<()> {
            let mut guard = ArtifactGuard::new();
            let mut renderer = TextRenderer { dir: dir.clone() };
            guard.render_with(&mut renderer, &chart(), "chart_1")?;
            Err(io::Error::new(io::ErrorKind::Other, "rendering stopped"))
        }
        let dir = scratch_dir("early");
        assert!(failing(&dir).is_err());
        assert!(!dir.join("chart_1.txt").exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_files_are_ignored() {
        let mut guard = ArtifactGuard::new();
        guard.track(std::env::temp_dir().join("survey_artifacts_never_created.txt"));
        assert_eq!(guard.paths().len(), 1);
    }
}
