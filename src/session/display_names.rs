use std::collections::HashMap;

use serde::Deserialize;

/// The fixed substring substitution applied to every tag before display.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TagRelabel {
    pub from: String,
    pub to: String,
}

impl Default for TagRelabel {
    fn default() -> Self {
        Self {
            from: "Brain".into(),
            to: "PGC".into(),
        }
    }
}

impl TagRelabel {
    pub fn identity() -> Self {
        Self {
            from: String::new(),
            to: String::new(),
        }
    }

    pub fn apply(&self, tag: &str) -> String {
        if self.from.is_empty() {
            tag.to_string()
        } else {
            tag.replace(&self.from, &self.to)
        }
    }
}

/// Two-way mapping between raw tags and the labels shown to the user.
///
/// Rebuilt from scratch for every tag set so nothing leaks between studies.
/// Labels are unique: when the substitution would make two tags collide, the
/// later one keeps its raw name, and failing that gets a numeric suffix.
#[derive(Debug, Clone, Default)]
pub struct DisplayNameMap {
    labels: Vec<String>,
    to_display: HashMap<String, String>,
    to_raw: HashMap<String, String>,
}

impl DisplayNameMap {
    pub fn build(tags: &[String], relabel: &TagRelabel) -> Self {
        let mut map = Self::default();
        for tag in tags {
            if map.to_display.contains_key(tag) {
                continue;
            }
            let label = map.unique_label(tag, relabel.apply(tag));
            map.labels.push(label.clone());
            map.to_display.insert(tag.clone(), label.clone());
            map.to_raw.insert(label, tag.clone());
        }
        map
    }

    fn unique_label(&self, tag: &str, preferred: String) -> String {
        if !self.to_raw.contains_key(&preferred) {
            return preferred;
        }
        if !self.to_raw.contains_key(tag) {
            return tag.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{tag} ({n})");
            if !self.to_raw.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn to_display(&self, tag: &str) -> Option<&str> {
        self.to_display.get(tag).map(String::as_str)
    }

    pub fn to_raw(&self, label: &str) -> Option<&str> {
        self.to_raw.get(label).map(String::as_str)
    }

    /// Labels in tag order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn substitutes_every_occurrence() {
        let relabel = TagRelabel::default();
        assert_eq!(relabel.apply("Brain/BrainSize"), "PGC/PGCSize");
        assert_eq!(relabel.apply("loss"), "loss");
        assert_eq!(TagRelabel::identity().apply("Brain"), "Brain");
    }

    #[test]
    fn round_trips_every_tag() {
        let set = tags(&["Brain/cells", "Brain/loss", "accuracy", "lr"]);
        let map = DisplayNameMap::build(&set, &TagRelabel::default());
        assert_eq!(map.len(), set.len());
        for tag in &set {
            let label = map.to_display(tag).unwrap();
            assert_eq!(map.to_raw(label), Some(tag.as_str()));
        }
        assert_eq!(map.labels()[0], "PGC/cells");
    }

    #[test]
    fn colliding_labels_stay_unique() {
        let set = tags(&["Brain/x", "PGC/x"]);
        let map = DisplayNameMap::build(&set, &TagRelabel::default());
        assert_eq!(map.to_display("Brain/x"), Some("PGC/x"));
        assert_eq!(map.to_display("PGC/x"), Some("PGC/x (2)"));
        assert_eq!(map.to_raw("PGC/x (2)"), Some("PGC/x"));

        let set = tags(&["Brain", "PGC"]);
        let relabel = TagRelabel {
            from: "Brain".into(),
            to: "PGC".into(),
        };
        let map = DisplayNameMap::build(&set, &relabel);
        let mut labels = map.labels().to_vec();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn rebuilding_drops_previous_study_labels() {
        let first = DisplayNameMap::build(&tags(&["Brain/a"]), &TagRelabel::default());
        assert!(first.to_raw("PGC/a").is_some());
        let second = DisplayNameMap::build(&tags(&["loss"]), &TagRelabel::default());
        assert!(second.to_raw("PGC/a").is_none());
        assert_eq!(second.to_raw("loss"), Some("loss"));
    }
}
