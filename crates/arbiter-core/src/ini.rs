//! Minimal INI parsing for credential files
//!
//! Just enough of the dialect to read `~/.aws/credentials` and
//! `~/.aws/config`: `[section]` headers, `key = value` pairs, `;`/`#`
//! comments. Keys outside any section land in the `""` section.

use std::collections::BTreeMap;

/// Key/value pairs of one section.
pub type Section = BTreeMap<String, String>;

/// All sections of a parsed document.
pub type Contents = BTreeMap<String, Section>;

/// Parses an INI document. Malformed lines are skipped rather than
/// rejected - credential files in the wild carry surprises.
pub fn parse(s: &str) -> Contents {
    let mut contents = Contents::new();
    let mut section = String::new();

    for raw in s.lines() {
        let line = match raw.find([';', '#']) {
            Some(pos) => raw[..pos].trim(),
            None => raw.trim(),
        };
        if line.is_empty() {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_string();
        } else if let Some((key, val)) = line.split_once('=') {
            contents
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_string(), val.trim().to_string());
        }
    }

    contents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_file() {
        let doc = "\
[default]
aws_access_key_id = AKIDEXAMPLE
aws_secret_access_key = wJalrXUtnFEMI/K7MDENG ; inline comment

[backup]
# full-line comment
aws_access_key_id=AKIDBACKUP
";
        let contents = parse(doc);
        assert_eq!(
            contents["default"]["aws_access_key_id"],
            "AKIDEXAMPLE"
        );
        assert_eq!(
            contents["default"]["aws_secret_access_key"],
            "wJalrXUtnFEMI/K7MDENG"
        );
        assert_eq!(contents["backup"]["aws_access_key_id"], "AKIDBACKUP");
    }

    #[test]
    fn test_sectionless_keys() {
        let contents = parse("region = us-west-2\n");
        assert_eq!(contents[""]["region"], "us-west-2");
    }

    #[test]
    fn test_garbage_lines_skipped() {
        let contents = parse("not an entry\n[ok]\na = 1\n");
        assert_eq!(contents.len(), 1);
        assert_eq!(contents["ok"]["a"], "1");
    }
}
