use std::collections::HashMap;

/// Per-agent hook run once per newly matched line. Given the regex match
/// dict, it returns the dict the runtime stores as either `query_source_dict`
/// (for WDCs with a query template) or `result_dict` (otherwise). Must not
/// mutate the working set or schedule work — it runs inline on the agent's
/// own worker.
pub trait TransformAndFilter: Send + Sync {
    fn transform(&self, match_dict: &HashMap<String, String>) -> HashMap<String, String>;
}

/// Passes the match dict through unchanged. Used by agents with no
/// per-record logic beyond what the regex already captured.
pub struct Identity;

impl TransformAndFilter for Identity {
    fn transform(&self, match_dict: &HashMap<String, String>) -> HashMap<String, String> {
        match_dict.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_passes_dict_through_unchanged() {
        let mut dict = HashMap::new();
        dict.insert("code".to_string(), "42".to_string());
        assert_eq!(Identity.transform(&dict), dict);
    }
}
