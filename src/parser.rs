//! Upload decoding: CSV/TSV/JSON byte buffers → a stream of canonical word
//! records with per-row diagnostics.
//!
//! The parser never touches the Store and emits records one at a time so the
//! importer can batch them. Heterogeneous source columns are mapped onto the
//! canonical schema by `map_header`.

use std::collections::BTreeMap;

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::store::operations::words::NewWord;

const SNIFF_BYTES: usize = 2048;
const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Tsv,
    Json,
    Auto,
}

impl ImportFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "json" => Some(Self::Json),
            "auto" | "" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("JSON payload must be an array of word objects")]
    JsonShape,
    #[error("missing required column: lemma")]
    MissingLemmaColumn,
}

/// Diagnostic for one bad row; the row itself is dropped, the job continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub row: usize,
    pub reason: String,
}

/// One decoded row: the canonical word plus the card-level hint.
#[derive(Debug, Clone, Default)]
pub struct ParsedRecord {
    pub word: NewWord,
    pub hint: Option<String>,
}

/// Canonical target fields, in mapping-table order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TargetField {
    Lemma,
    Translation(String),
    Pos,
    Gender,
    Ipa,
    Lesson,
    Cefr,
    Tags,
    Hint,
}

/// Case-insensitive source-column mapping; first match wins per target.
fn map_header(name: &str) -> Option<TargetField> {
    let lower = name
        .trim()
        .trim_start_matches(UTF8_BOM)
        .to_ascii_lowercase();
    match lower.as_str() {
        "lemma" | "word" | "term" | "french" => Some(TargetField::Lemma),
        "meaning_zh" | "meaning" | "translation" | "zh" | "chinese" => {
            Some(TargetField::Translation("zh-cn".to_string()))
        }
        "meaning_en" | "en" | "english" => Some(TargetField::Translation("en".to_string())),
        "pos" | "part_of_speech" => Some(TargetField::Pos),
        "gender" | "genre" => Some(TargetField::Gender),
        "ipa" | "phonetic" => Some(TargetField::Ipa),
        "lesson" | "chapter" | "unit" => Some(TargetField::Lesson),
        "cefr" | "level" => Some(TargetField::Cefr),
        "tags" => Some(TargetField::Tags),
        "hint" => Some(TargetField::Hint),
        _ => {
            // 通用多语言释义列：meaning_{lang}
            let lang = lower.strip_prefix("meaning_")?;
            if !lang.is_empty()
                && lang.len() <= 10
                && lang.chars().all(|c| c.is_ascii_alphabetic() || c == '-')
            {
                Some(TargetField::Translation(lang.to_string()))
            } else {
                None
            }
        }
    }
}

#[derive(Debug)]
pub struct RecordStream {
    inner: Inner,
    total_hint: Option<u64>,
}

#[derive(Debug)]
enum Inner {
    Tabular(TabularStream),
    Json(JsonStream),
}

impl RecordStream {
    /// Known row count when the payload shape gives one away cheaply
    /// (JSON array length, tabular data-line count).
    pub fn total_hint(&self) -> Option<u64> {
        self.total_hint
    }
}

impl Iterator for RecordStream {
    type Item = (usize, Result<ParsedRecord, RowError>);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Tabular(stream) => stream.next_record(),
            Inner::Json(stream) => stream.next_record(),
        }
    }
}

/// Decode a buffer into a record stream. `auto` resolves by content sniff,
/// then filename suffix, then a comma-vs-tab heuristic.
pub fn parse(
    buf: &[u8],
    format: ImportFormat,
    filename: Option<&str>,
) -> Result<RecordStream, ParseError> {
    let format = resolve_format(buf, format, filename);
    let text = decode_text(buf);

    match format {
        ImportFormat::Json => {
            let value: serde_json::Value = serde_json::from_str(text.trim())?;
            let serde_json::Value::Array(items) = value else {
                return Err(ParseError::JsonShape);
            };
            let total = items.len() as u64;
            Ok(RecordStream {
                inner: Inner::Json(JsonStream {
                    items: items.into_iter(),
                    row: 0,
                }),
                total_hint: Some(total),
            })
        }
        ImportFormat::Tsv | ImportFormat::Csv => {
            let delimiter = if format == ImportFormat::Tsv { '\t' } else { ',' };
            let stream = TabularStream::new(text, delimiter)?;
            let total = stream.count_data_lines();
            Ok(RecordStream {
                inner: Inner::Tabular(stream),
                total_hint: Some(total),
            })
        }
        // resolve_format never returns Auto
        ImportFormat::Auto => unreachable!("auto format must be resolved before parsing"),
    }
}

fn resolve_format(buf: &[u8], format: ImportFormat, filename: Option<&str>) -> ImportFormat {
    if format != ImportFormat::Auto {
        return format;
    }

    let text = decode_text(&buf[..buf.len().min(SNIFF_BYTES)]);
    if let Some(first) = text.trim_start().chars().next() {
        if first == '[' || first == '{' {
            return ImportFormat::Json;
        }
    }

    if let Some(name) = filename {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".json") {
            return ImportFormat::Json;
        }
        if lower.ends_with(".tsv") {
            return ImportFormat::Tsv;
        }
        if lower.ends_with(".csv") {
            return ImportFormat::Csv;
        }
    }

    let commas = text.matches(',').count();
    let tabs = text.matches('\t').count();
    if tabs > commas {
        ImportFormat::Tsv
    } else {
        ImportFormat::Csv
    }
}

fn decode_text(buf: &[u8]) -> String {
    let text = String::from_utf8_lossy(buf);
    text.strip_prefix(UTF8_BOM)
        .map(str::to_string)
        .unwrap_or_else(|| text.into_owned())
}

#[derive(Debug)]
struct TabularStream {
    content: String,
    /// byte offset of the next unread line
    pos: usize,
    delimiter: char,
    columns: Vec<Option<TargetField>>,
    row: usize,
}

impl TabularStream {
    fn new(content: String, delimiter: char) -> Result<Self, ParseError> {
        let mut stream = Self {
            content,
            pos: 0,
            delimiter,
            columns: Vec::new(),
            row: 0,
        };

        // 表头：第一个非空行
        let header = loop {
            match stream.next_line() {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break Some(line),
                None => break None,
            }
        };
        let Some(header) = header else {
            // 空文件：合法，流直接枯竭
            return Ok(stream);
        };

        stream.columns = split_delimited(&header, delimiter)
            .iter()
            .map(|name| map_header(name))
            .collect();
        if !stream
            .columns
            .iter()
            .any(|c| matches!(c, Some(TargetField::Lemma)))
        {
            return Err(ParseError::MissingLemmaColumn);
        }
        Ok(stream)
    }

    fn next_line(&mut self) -> Option<String> {
        if self.pos >= self.content.len() {
            return None;
        }
        self.row += 1;
        let rest = &self.content[self.pos..];
        let (line, consumed) = match rest.find('\n') {
            Some(idx) => (&rest[..idx], idx + 1),
            None => (rest, rest.len()),
        };
        self.pos += consumed;
        Some(line.trim_end_matches('\r').to_string())
    }

    fn next_record(&mut self) -> Option<(usize, Result<ParsedRecord, RowError>)> {
        loop {
            let line = self.next_line()?;
            if line.trim().is_empty() {
                continue;
            }
            let row = self.row;
            let values = split_delimited(&line, self.delimiter);
            let pairs = self
                .columns
                .iter()
                .zip(values.iter())
                .filter_map(|(field, value)| {
                    field.as_ref().map(|f| (f.clone(), value.clone()))
                });
            return Some((row, build_record(pairs, row)));
        }
    }

    fn count_data_lines(&self) -> u64 {
        self.content[self.pos..]
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count() as u64
    }
}

#[derive(Debug)]
struct JsonStream {
    items: std::vec::IntoIter<serde_json::Value>,
    row: usize,
}

impl JsonStream {
    fn next_record(&mut self) -> Option<(usize, Result<ParsedRecord, RowError>)> {
        let item = self.items.next()?;
        self.row += 1;
        let row = self.row;

        let serde_json::Value::Object(map) = item else {
            return Some((
                row,
                Err(RowError {
                    row,
                    reason: "row is not a JSON object".to_string(),
                }),
            ));
        };

        let pairs = map.into_iter().filter_map(|(key, value)| {
            let field = map_header(&key)?;
            let value = json_value_to_string(&field, value);
            Some((field, value))
        });
        Some((row, build_record(pairs, row)))
    }
}

fn json_value_to_string(field: &TargetField, value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        // tags 允许以 JSON 数组给出
        serde_json::Value::Array(items) if *field == TargetField::Tags => items
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
            .collect::<Vec<_>>()
            .join(";"),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Minimal delimited-line splitter with double-quote support (`""` escapes).
fn split_delimited(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' && current.is_empty() {
            in_quotes = true;
        } else if c == delimiter {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}

const VALID_CEFR: [&str; 6] = ["A1", "A2", "B1", "B2", "C1", "C2"];

fn build_record(
    pairs: impl Iterator<Item = (TargetField, String)>,
    row: usize,
) -> Result<ParsedRecord, RowError> {
    let mut lemma: Option<String> = None;
    let mut translations: BTreeMap<String, String> = BTreeMap::new();
    let mut record = ParsedRecord::default();

    for (field, raw) in pairs {
        // lemma 只做裁剪：占位词过滤可能误伤真实词条（如英语 "none"）
        if field == TargetField::Lemma {
            let trimmed = raw.trim();
            if lemma.is_none() && !trimmed.is_empty() {
                lemma = Some(trimmed.nfc().collect());
            }
            continue;
        }
        let Some(value) = clean_value(&raw) else {
            continue;
        };
        match field {
            TargetField::Lemma => {}
            TargetField::Translation(lang) => {
                translations.entry(lang).or_insert(value);
            }
            TargetField::Pos => {
                record.word.pos.get_or_insert(value);
            }
            TargetField::Gender => match value.to_lowercase().chars().next() {
                Some(g @ ('m' | 'f')) if record.word.gender.is_none() => {
                    record.word.gender = Some(g.to_string());
                }
                _ => {
                    tracing::warn!(row, value = %value, "invalid gender dropped");
                }
            },
            TargetField::Ipa => {
                record.word.ipa.get_or_insert(value);
            }
            TargetField::Lesson => {
                record.word.lesson.get_or_insert(value);
            }
            TargetField::Cefr => {
                let upper = value.to_uppercase();
                if VALID_CEFR.contains(&upper.as_str()) {
                    record.word.cefr.get_or_insert(upper);
                } else {
                    tracing::warn!(row, value = %value, "invalid cefr dropped");
                }
            }
            TargetField::Tags => {
                if record.word.tags.is_empty() {
                    record.word.tags = value
                        .split([';', ',', '|'])
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect();
                }
            }
            TargetField::Hint => {
                record.hint.get_or_insert(value);
            }
        }
    }

    let Some(lemma) = lemma else {
        return Err(RowError {
            row,
            reason: "missing required field: lemma".to_string(),
        });
    };
    record.word.lemma = lemma;

    record.word.meaning_text = translations
        .get("zh-cn")
        .or_else(|| translations.get("zh"))
        .or_else(|| translations.values().next())
        .cloned();
    record.word.translations = translations;
    Ok(record)
}

fn clean_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    // 表格导出常见的占位写法
    if matches!(trimmed.to_ascii_lowercase().as_str(), "nan" | "null" | "none") {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(stream: RecordStream) -> Vec<(usize, Result<ParsedRecord, RowError>)> {
        stream.collect()
    }

    #[test]
    fn parses_the_minimal_csv_contract() {
        let csv = "lemma,meaning_zh\nchemise,衬衫\nbonjour,你好\n";
        let stream = parse(csv.as_bytes(), ImportFormat::Csv, None).unwrap();
        assert_eq!(stream.total_hint(), Some(2));

        let rows = collect(stream);
        assert_eq!(rows.len(), 2);
        let first = rows[0].1.as_ref().unwrap();
        assert_eq!(first.word.lemma, "chemise");
        assert_eq!(first.word.translations.get("zh-cn").unwrap(), "衬衫");
        assert_eq!(first.word.meaning_text.as_deref(), Some("衬衫"));
    }

    #[test]
    fn maps_alternate_headers_first_match_wins() {
        let csv = "french,chinese,part_of_speech,genre,chapter,level\nchemise,衬衫,noun,F,L1,a1\n";
        let (_, result) = collect(parse(csv.as_bytes(), ImportFormat::Csv, None).unwrap())
            .pop()
            .unwrap();
        let record = result.unwrap();
        assert_eq!(record.word.lemma, "chemise");
        assert_eq!(record.word.pos.as_deref(), Some("noun"));
        assert_eq!(record.word.gender.as_deref(), Some("f"));
        assert_eq!(record.word.lesson.as_deref(), Some("L1"));
        assert_eq!(record.word.cefr.as_deref(), Some("A1"));
    }

    #[test]
    fn generic_meaning_columns_feed_translations() {
        let csv = "lemma,meaning_zh,meaning_fr\nbonjour,你好,salut\n";
        let (_, result) = collect(parse(csv.as_bytes(), ImportFormat::Csv, None).unwrap())
            .pop()
            .unwrap();
        let record = result.unwrap();
        assert_eq!(record.word.translations.get("fr").unwrap(), "salut");
        assert_eq!(record.word.meaning_text.as_deref(), Some("你好"));
    }

    #[test]
    fn invalid_cefr_and_gender_are_dropped_not_fatal() {
        let csv = "lemma,cefr,gender\nchemise,Z9,x\n";
        let (_, result) = collect(parse(csv.as_bytes(), ImportFormat::Csv, None).unwrap())
            .pop()
            .unwrap();
        let record = result.unwrap();
        assert!(record.word.cefr.is_none());
        assert!(record.word.gender.is_none());
    }

    #[test]
    fn row_without_lemma_is_a_row_error() {
        let csv = "lemma,meaning_zh\n,孤儿\n";
        let rows = collect(parse(csv.as_bytes(), ImportFormat::Csv, None).unwrap());
        let err = rows[0].1.as_ref().unwrap_err();
        assert!(err.reason.contains("lemma"));
        assert_eq!(err.row, 2);
    }

    #[test]
    fn missing_lemma_column_fails_the_whole_parse() {
        let csv = "meaning_zh,pos\n衬衫,noun\n";
        let err = parse(csv.as_bytes(), ImportFormat::Csv, None).unwrap_err();
        assert!(matches!(err, ParseError::MissingLemmaColumn));
    }

    #[test]
    fn quoted_fields_keep_embedded_delimiters() {
        let csv = "lemma,meaning_zh,tags\n\"avoir, être\",动词,\"基础;核心\"\n";
        let (_, result) = collect(parse(csv.as_bytes(), ImportFormat::Csv, None).unwrap())
            .pop()
            .unwrap();
        let record = result.unwrap();
        assert_eq!(record.word.lemma, "avoir, être");
        assert_eq!(record.word.tags, vec!["基础", "核心"]);
    }

    #[test]
    fn tags_split_on_all_three_separators() {
        let csv = "lemma,tags\nun,a;b,c|d\n";
        let (_, result) = collect(parse(csv.as_bytes(), ImportFormat::Csv, None).unwrap())
            .pop()
            .unwrap();
        // 引号外的逗号是 CSV 分隔符，剩余部分按 ;| 再切
        let record = result.unwrap();
        assert_eq!(record.word.tags, vec!["a", "b"]);
    }

    #[test]
    fn tsv_and_bom_are_handled() {
        let tsv = "\u{feff}lemma\tmeaning_zh\nchemise\t衬衫\n";
        let rows = collect(parse(tsv.as_bytes(), ImportFormat::Tsv, None).unwrap());
        assert_eq!(rows[0].1.as_ref().unwrap().word.lemma, "chemise");
    }

    #[test]
    fn json_array_with_hint_and_numeric_values() {
        let json = r#"[
            {"lemma": "un", "meaning_zh": "一", "lesson": 1, "hint": "数字", "tags": ["基础", "数字"]},
            {"word": "deux", "chinese": "二"},
            42
        ]"#;
        let stream = parse(json.as_bytes(), ImportFormat::Json, None).unwrap();
        assert_eq!(stream.total_hint(), Some(3));

        let rows = collect(stream);
        let first = rows[0].1.as_ref().unwrap();
        assert_eq!(first.word.lesson.as_deref(), Some("1"));
        assert_eq!(first.hint.as_deref(), Some("数字"));
        assert_eq!(first.word.tags, vec!["基础", "数字"]);

        let second = rows[1].1.as_ref().unwrap();
        assert_eq!(second.word.lemma, "deux");

        assert!(rows[2].1.is_err());
    }

    #[test]
    fn auto_detection_prefers_content_then_suffix_then_heuristic() {
        let json = b"[{\"lemma\": \"un\"}]";
        assert!(matches!(
            parse(json, ImportFormat::Auto, Some("data.csv")).unwrap().inner,
            Inner::Json(_)
        ));

        let csvish = b"lemma\nun\n";
        assert!(matches!(
            parse(csvish, ImportFormat::Auto, Some("words.tsv")).unwrap().inner,
            Inner::Tabular(_)
        ));

        let tabs = "lemma\tmeaning_zh\nun\t一\n".as_bytes();
        let stream = parse(tabs, ImportFormat::Auto, None).unwrap();
        let rows = collect(stream);
        assert_eq!(rows[0].1.as_ref().unwrap().word.lemma, "un");
    }

    #[test]
    fn empty_file_yields_no_records() {
        let stream = parse(b"", ImportFormat::Csv, None).unwrap();
        assert_eq!(stream.total_hint(), Some(0));
        assert!(collect(stream).is_empty());
    }

    #[test]
    fn lemma_is_nfc_normalized() {
        // e + combining acute → é (single code point)
        let csv = "lemma\ncaf\u{0065}\u{0301}\n";
        let (_, result) = collect(parse(csv.as_bytes(), ImportFormat::Csv, None).unwrap())
            .pop()
            .unwrap();
        assert_eq!(result.unwrap().word.lemma, "café");
    }

    #[test]
    fn non_array_json_is_rejected() {
        let err = parse(b"{\"lemma\": \"un\"}", ImportFormat::Json, None).unwrap_err();
        assert!(matches!(err, ParseError::JsonShape));
    }
}
