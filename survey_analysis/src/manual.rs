/*!

This is the long-form manual for `survey_analysis` and `survey-report`.

## Input tables

Each source of answers (one CSV file or one worksheet) becomes one
`ResponseTable`. The header row holds the question texts and every other row
is one respondent. Two tags are attached to every record when the table is
built, and they never change afterwards:

* the respondent type (`company`, `investor` or `unknown`), inferred from the
  source name: a name mentioning `投資` is an investor questionnaire, a name
  mentioning `公司` a company questionnaire
* the phase (`phase 1` to `phase 3`, or unset), inferred from stage markers in
  the source name such as `第一階段`, `phase2` or `stage 3`

Both can be set explicitly for a source. A table covering several phases can
also name a phase column: the stage label found in each answer of that column
then gives the phase of the record.

Column names are cleaned on load: bracketed tags such as `【單選】` are
removed and embedded line breaks become spaces. Empty names become
`未命名<n>` (untitled).

Answers are normalized on load: full-width characters become half-width,
range separators are unified (`１０％～２０％` becomes `10-20%`) and a few
synonyms are collapsed (`不固定` becomes `不定期`). Multi-select answers keep
one option per line.

## Analysis modes

### `topics`

A catalogue of canonical questions is given, each with a title and an
optional description. For each topic, every table is searched for the
column asking that question. The strategies are tried in order and the first
one that succeeds wins:

1. the exact question text, when the column has at least one answer
2. a curated alias of the question
3. equality after light normalization, which removes polite prefixes such as
   `請問貴公司` or `您投資的公司之`
4. a column containing every word of the question

Administrative questions (company name, e-mail, scores and prices) are never
resolved. A topic that no table contains is still listed in the report, as
not present.

### `merged`

All the tables are concatenated and the columns asking the same question are
merged. Column names are compared after heavy normalization (polite
prefixes, known paraphrases and punctuation removed). Identical forms are
merged first; the others are merged when their similarity ratio, lowered
when they share few content words, reaches the similarity threshold (0.72 by
default). The shortest name of each group is kept and its missing answers are
filled from the other columns of the group. Existing answers are never
overwritten.

## Tests

Each question is compared across respondent types, then across phases.

| Answers        | Groups | Test                                          |
|----------------|--------|-----------------------------------------------|
| categorical    | 2x2, fewer than 20 answers | Fisher exact test         |
| categorical    | other  | chi-square test of independence (Yates for 2x2) |
| numeric        | 2      | Mann-Whitney U, with Cohen's d                |
| numeric        | 3      | Kruskal-Wallis H                              |
| multi-select   | any    | one chi-square (or Fisher) test per option    |

A question is numeric when at least 70% of its answers are numbers. It is
multi-select when an answer holds several lines.

A test is not performed, and the report says why, when:

* fewer than two groups answered
* a group has fewer than 3 respondents
* every answer falls in the same category
* an expected count is 1 or less (chi-square)
* every numeric value is the same

The p-values are reported with the markers `***` (p < 0.001), `**`
(p < 0.01), `*` (p < 0.05) and `n.s.`. Cramér's V is read as negligible,
small, medium or large at 0.1, 0.3 and 0.5; Cohen's d at 0.2, 0.5 and 0.8.

## Category order

Categories are displayed in a domain-aware order: percentages, years,
amounts of money (`萬`, `百萬`, `千萬`, `億`), months and headcounts by their
lower bound, with "below" phrasings first and "above" phrasings last;
frequencies from weekly to never; Likert scales from the most negative to
the most positive; stages from one to three; yes before no; then everything
else alphabetically.

## Configuration file

The `survey-report` program reads a JSON file:

```json
{
  "reportTitle": "Corporate governance survey",
  "analysisMode": "topics",
  "sources": [
    { "filePath": "公司問卷第一階段.csv", "provider": "csv" },
    { "filePath": "投資方問卷.xlsx", "provider": "xlsx", "phase": "phase2" }
  ],
  "phaseColumn": "公司目前所處階段",
  "topicFile": "topics.json",
  "aliasFile": "aliases.json",
  "excludedColumns": ["填答時間"],
  "similarityThreshold": 0.72
}
```

Paths are relative to the configuration file. The alias file is a list of
pairs of question texts.
*/
