use itertools::Itertools;

pub trait StringExtensions {
    /// Split a comma-separated tag string into clean tag names.
    /// E.g. `split_tags("date night, thriller , ") == ["date night", "thriller"]`
    fn split_tags(&self) -> Vec<String>;
}

impl StringExtensions for String {
    fn split_tags(&self) -> Vec<String> {
        self.split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect_vec()
    }
}

#[test]
fn test_split_tags() {
    assert_eq!(
        "date night, thriller,  rewatch".to_string().split_tags(),
        vec!["date night", "thriller", "rewatch"]
    );

    // duplicates survive the split; dedup happens at the link level
    assert_eq!(
        "a, b, a".to_string().split_tags(),
        vec!["a", "b", "a"]
    );

    assert_eq!(" , ,".to_string().split_tags(), Vec::<String>::new());
    assert_eq!("".to_string().split_tags(), Vec::<String>::new());
}
