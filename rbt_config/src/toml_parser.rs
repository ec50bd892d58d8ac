use crate::error::{ConfigError, ConfigResult};
use std::collections::HashMap;

/// Flattened TOML document: `section.key` -> value
pub type TomlTable = HashMap<String, TomlValue>;

/// Minimal TOML reader for rbt configuration files.
///
/// Handles `[section]` headers, `key = value` pairs, full-line and trailing
/// `#` comments, and scalar or flat array values. Nested tables and
/// multi-line values are not supported.
pub struct TomlParser;

impl TomlParser {
    /// Parse a TOML string into a flat table keyed by `section.key`
    pub fn parse(content: &str) -> ConfigResult<TomlTable> {
        let mut result = HashMap::new();
        let mut current_section = String::new();

        for (idx, raw) in content.lines().enumerate() {
            let line_num = idx + 1;
            let line = Self::strip_comment(raw).trim();

            if line.is_empty() {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let Some(name) = header.strip_suffix(']') else {
                    return Err(ConfigError::Toml(format!(
                        "Unclosed section header on line {}: '{}'",
                        line_num, line
                    )));
                };
                let name = name.trim();
                if name.is_empty() || !name.chars().all(Self::is_key_char) {
                    return Err(ConfigError::Toml(format!(
                        "Invalid section name on line {}: '{}'",
                        line_num, name
                    )));
                }
                current_section = name.to_string();
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Toml(format!(
                    "Invalid line {}: '{}'",
                    line_num, line
                )));
            };
            let key = key.trim();
            if key.is_empty() || !key.chars().all(Self::is_key_char) {
                return Err(ConfigError::Toml(format!(
                    "Invalid key on line {}: '{}'",
                    line_num, key
                )));
            }

            let full_key = if current_section.is_empty() {
                key.to_string()
            } else {
                format!("{}.{}", current_section, key)
            };

            let value = Self::parse_value(value.trim()).map_err(|e| match e {
                ConfigError::Toml(msg) => ConfigError::Toml(format!("line {}: {}", line_num, msg)),
                other => other,
            })?;

            if result.insert(full_key.clone(), value).is_some() {
                return Err(ConfigError::Toml(format!(
                    "Duplicate key '{}' on line {}",
                    full_key, line_num
                )));
            }
        }

        Ok(result)
    }

    fn is_key_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
    }

    /// Drop a trailing `#` comment that is not inside a quoted string
    fn strip_comment(line: &str) -> &str {
        let mut in_string = false;
        let mut escaped = false;
        for (i, c) in line.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' if in_string => escaped = true,
                '"' => in_string = !in_string,
                '#' if !in_string => return &line[..i],
                _ => {}
            }
        }
        line
    }

    fn parse_value(value: &str) -> ConfigResult<TomlValue> {
        if value.is_empty() {
            return Err(ConfigError::Toml("Missing value".to_string()));
        }

        if let Some(quoted) = value.strip_prefix('"') {
            return Self::parse_string(quoted, value);
        }

        if let Some(inner) = value.strip_prefix('[') {
            let Some(content) = inner.strip_suffix(']') else {
                return Err(ConfigError::Toml(format!("Unterminated array: {}", value)));
            };
            let mut array = Vec::new();
            for item in Self::split_array(content)? {
                let trimmed = item.trim();
                if !trimmed.is_empty() {
                    array.push(Self::parse_value(trimmed)?);
                }
            }
            return Ok(TomlValue::Array(array));
        }

        match value {
            "true" => return Ok(TomlValue::Bool(true)),
            "false" => return Ok(TomlValue::Bool(false)),
            _ => {}
        }

        // Numbers start with a digit; `nan` and `inf` stay bare words
        let numeric = value.replace('_', "");
        if numeric
            .trim_start_matches(['+', '-'])
            .starts_with(|c: char| c.is_ascii_digit())
        {
            if let Ok(int_val) = numeric.parse::<i64>() {
                return Ok(TomlValue::Integer(int_val));
            }
            if let Ok(float_val) = numeric.parse::<f64>() {
                return Ok(TomlValue::Float(float_val));
            }
        }

        // Bare words are accepted as strings (e.g. `level = debug`)
        if value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Ok(TomlValue::String(value.to_string()));
        }

        Err(ConfigError::Toml(format!("Unsupported value: '{}'", value)))
    }

    /// Reads a basic string after its opening quote. Only `\"` and `\\`
    /// are recognised escapes; nothing may follow the closing quote.
    fn parse_string(quoted: &str, value: &str) -> ConfigResult<TomlValue> {
        let mut content = String::new();
        let mut chars = quoted.char_indices();

        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped @ ('"' | '\\'))) => content.push(escaped),
                    Some((_, other)) => {
                        return Err(ConfigError::Toml(format!(
                            "Unsupported escape '\\{}' in {}",
                            other, value
                        )));
                    }
                    None => break,
                },
                '"' => {
                    let rest = quoted[i + 1..].trim();
                    if !rest.is_empty() {
                        return Err(ConfigError::Toml(format!(
                            "Unexpected '{}' after string {}",
                            rest, value
                        )));
                    }
                    return Ok(TomlValue::String(content));
                }
                _ => content.push(c),
            }
        }

        Err(ConfigError::Toml(format!("Unterminated string: {}", value)))
    }

    /// Splits array content on commas outside strings and nested arrays
    fn split_array(content: &str) -> ConfigResult<Vec<&str>> {
        let mut items = Vec::new();
        let mut start = 0;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (i, c) in content.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' if in_string => escaped = true,
                '"' => in_string = !in_string,
                '[' if !in_string => depth += 1,
                ']' if !in_string => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        ConfigError::Toml(format!("Unbalanced ']' in array: [{}]", content))
                    })?;
                }
                ',' if !in_string && depth == 0 => {
                    items.push(&content[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }

        if in_string || depth != 0 {
            return Err(ConfigError::Toml(format!("Unterminated array: [{}]", content)));
        }
        items.push(&content[start..]);
        Ok(items)
    }
}

/// TOML value types supported by our parser
#[derive(Debug, Clone, PartialEq)]
pub enum TomlValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<TomlValue>),
}

impl TomlValue {
    /// Get value as string or return error
    pub fn as_string(&self) -> ConfigResult<&str> {
        match self {
            TomlValue::String(s) => Ok(s),
            _ => Err(ConfigError::Validation("Expected string value".to_string())),
        }
    }

    /// Get value as integer or return error
    pub fn as_integer(&self) -> ConfigResult<i64> {
        match self {
            TomlValue::Integer(i) => Ok(*i),
            _ => Err(ConfigError::Validation("Expected integer value".to_string())),
        }
    }

    /// Get value as a non-negative integer that fits in `u32`
    pub fn as_u32(&self) -> ConfigResult<u32> {
        let i = self.as_integer()?;
        u32::try_from(i).map_err(|_| {
            ConfigError::Validation(format!("Value {} is out of range for an unsigned 32-bit integer", i))
        })
    }

    /// Get value as boolean or return error
    pub fn as_bool(&self) -> ConfigResult<bool> {
        match self {
            TomlValue::Bool(b) => Ok(*b),
            _ => Err(ConfigError::Validation("Expected boolean value".to_string())),
        }
    }

    /// Render as a TOML literal
    pub fn to_toml_literal(&self) -> String {
        match self {
            TomlValue::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            TomlValue::Integer(i) => i.to_string(),
            TomlValue::Float(f) => format!("{:?}", f),
            TomlValue::Bool(b) => b.to_string(),
            TomlValue::Array(arr) => {
                let items: Vec<String> = arr.iter().map(TomlValue::to_toml_literal).collect();
                format!("[{}]", items.join(", "))
            }
        }
    }
}

impl From<&str> for TomlValue {
    fn from(value: &str) -> Self {
        TomlValue::String(value.to_string())
    }
}

impl From<i64> for TomlValue {
    fn from(value: i64) -> Self {
        TomlValue::Integer(value)
    }
}

impl From<bool> for TomlValue {
    fn from(value: bool) -> Self {
        TomlValue::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections_and_comments() {
        let content = r#"
# engine settings
[tree]
initial_capacity = 1_024   # reserve up front
validate_each_step = true
name = "hash # not a comment"

[log]
level = debug
"#;
        let table = TomlParser::parse(content).expect("parse failed");

        assert_eq!(table.get("tree.initial_capacity"), Some(&TomlValue::Integer(1024)));
        assert_eq!(table.get("tree.validate_each_step"), Some(&TomlValue::Bool(true)));
        assert_eq!(
            table.get("tree.name"),
            Some(&TomlValue::String("hash # not a comment".to_string()))
        );
        assert_eq!(table.get("log.level"), Some(&TomlValue::String("debug".to_string())));
    }

    #[test]
    fn test_parse_arrays_and_floats() {
        let table = TomlParser::parse("keys = [3, 1, 2]\nratio = 0.75").expect("parse failed");
        assert_eq!(
            table.get("keys"),
            Some(&TomlValue::Array(vec![
                TomlValue::Integer(3),
                TomlValue::Integer(1),
                TomlValue::Integer(2),
            ]))
        );
        assert_eq!(table.get("ratio"), Some(&TomlValue::Float(0.75)));
    }

    #[test]
    fn test_invalid_line_reports_line_number() {
        let err = TomlParser::parse("[tree]\nthis is not toml").expect_err("should fail");
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let err = TomlParser::parse("[tree]\ndump_limit = 1\ndump_limit = 2").expect_err("should fail");
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_unterminated_string_rejected() {
        assert!(TomlParser::parse("name = \"open").is_err());
        assert!(TomlParser::parse("[tree").is_err());
    }

    #[test]
    fn test_escaped_closing_quote_is_unterminated() {
        let err = TomlParser::parse(r#"name = "abc\""#).expect_err("should fail");
        assert!(err.to_string().contains("Unterminated string"), "{}", err);

        let table = TomlParser::parse(r#"path = "C:\\tmp\\""#).expect("parse failed");
        assert_eq!(table.get("path"), Some(&TomlValue::from(r"C:\tmp\")));

        assert!(TomlParser::parse(r#"name = "a" b"#).is_err());
    }

    #[test]
    fn test_array_items_keep_commas_in_strings() {
        let table = TomlParser::parse(r#"tags = ["a,b", "c", [1, 2]]"#).expect("parse failed");
        assert_eq!(
            table.get("tags"),
            Some(&TomlValue::Array(vec![
                TomlValue::from("a,b"),
                TomlValue::from("c"),
                TomlValue::Array(vec![TomlValue::Integer(1), TomlValue::Integer(2)]),
            ]))
        );
        assert!(TomlParser::parse(r#"tags = ["a, b]"#).is_err());
    }

    #[test]
    fn test_nan_and_inf_are_bare_words() {
        let table = TomlParser::parse("a = nan\nb = inf\nc = -2.5e3").expect("parse failed");
        assert_eq!(table.get("a"), Some(&TomlValue::from("nan")));
        assert_eq!(table.get("b"), Some(&TomlValue::from("inf")));
        assert_eq!(table.get("c"), Some(&TomlValue::Float(-2500.0)));
    }

    #[test]
    fn test_as_u32_range() {
        assert_eq!(TomlValue::Integer(7).as_u32().ok(), Some(7));
        assert!(TomlValue::Integer(-1).as_u32().is_err());
        assert!(TomlValue::Bool(true).as_u32().is_err());
    }

    #[test]
    fn test_literal_round_trip() {
        let value = TomlValue::String("say \"hi\"".to_string());
        let table = TomlParser::parse(&format!("greeting = {}", value.to_toml_literal()))
            .expect("parse failed");
        assert_eq!(table.get("greeting"), Some(&value));
    }
}
