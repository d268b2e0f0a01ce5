use regex::Regex;
use std::collections::HashMap;

/// A compiled pattern bound to one path file. The pattern must use named
/// capture groups; a match produces a mapping from group name to captured
/// string.
pub struct RegexSource {
    pub path_file_name: String,
    pattern: Regex,
}

impl RegexSource {
    pub fn compile(path_file_name: String, pattern: &str) -> Result<Self, regex::Error> {
        Ok(RegexSource {
            path_file_name,
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn match_line(&self, line: &str) -> Option<HashMap<String, String>> {
        let captures = self.pattern.captures(line)?;
        let mut dict = HashMap::new();
        for name in self.pattern.capture_names().flatten() {
            if let Some(value) = captures.name(name) {
                dict.insert(name.to_string(), value.as_str().to_string());
            }
        }
        Some(dict)
    }
}
