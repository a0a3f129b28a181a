use std::collections::HashMap;

use log::debug;

use crate::scene::NameRecord;

/// Prefix exporters put in front of shape names.
const NOISE_PREFIX: &str = "Tri ";

/// Limit for object, mesh, material and armature names.
pub const OBJECT_NAME_LENGTH: usize = 22;
/// Limit for joint and vertex group names.
pub const BONE_NAME_LENGTH: usize = 32;

fn truncate(text: &str, length: usize) -> &str {
    match text.char_indices().nth(length) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Maps native names to unique identifiers of bounded length for one run.
#[derive(Debug, Default)]
pub struct NameResolver {
    resolved: HashMap<(String, usize), String>,
    owners: HashMap<String, String>,
    order: Vec<String>,
}

impl NameResolver {
    /// Identifier for `native`, at most `max_length - 1` characters unless a
    /// `.NN` suffix was needed. Resolving the same name again returns the
    /// same identifier.
    pub fn resolve(&mut self, native: &str, max_length: usize) -> String {
        let key = (native.to_string(), max_length);
        if let Some(identifier) = self.resolved.get(&key) {
            return identifier.clone();
        }

        let stripped = native.strip_prefix(NOISE_PREFIX).unwrap_or(native);
        let mut identifier = truncate(stripped, max_length.saturating_sub(1)).to_string();
        let mut suffix = 0;
        while self
            .owners
            .get(&identifier)
            .is_some_and(|owner| owner != native)
        {
            identifier = format!(
                "{}.{:02}",
                truncate(stripped, max_length.saturating_sub(4)),
                suffix
            );
            suffix += 1;
        }

        if identifier != native {
            debug!("Name {:?} resolved as {:?}", native, identifier);
        }
        if !self.owners.contains_key(&identifier) {
            self.owners.insert(identifier.clone(), native.to_string());
            self.order.push(identifier.clone());
        }
        self.resolved.insert(key, identifier.clone());
        identifier
    }

    /// Native name an identifier was resolved from.
    pub fn lookup(&self, identifier: &str) -> Option<&str> {
        self.owners.get(identifier).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every identifier with its native name, in resolution order.
    pub fn records(&self) -> Vec<NameRecord> {
        self.order
            .iter()
            .filter_map(|identifier| {
                let native = self.owners.get(identifier)?;
                Some(NameRecord {
                    identifier: identifier.clone(),
                    native: native.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::{NameResolver, BONE_NAME_LENGTH, OBJECT_NAME_LENGTH};

    const NAMES: &[&str] = &[
        "Bip01 L Forearm",
        "Bip01 L Forearm Twist Helper Node",
        "Bip01 L Forearm Twist Helper Node 2",
        "Tri Shield 0",
        "Shield 0",
        "",
        "Scene Root",
        "Scene Root",
    ];

    #[test]
    fn reverse_lookup_returns_native_name() {
        for length in [5, 8, OBJECT_NAME_LENGTH, BONE_NAME_LENGTH] {
            let mut names = NameResolver::default();
            for native in NAMES {
                let identifier = names.resolve(native, length);
                assert_eq!(names.lookup(&identifier), Some(*native));
            }
        }
    }

    #[test]
    fn distinct_names_get_distinct_identifiers() {
        for length in [5, 8, OBJECT_NAME_LENGTH, BONE_NAME_LENGTH] {
            let mut names = NameResolver::default();
            let natives: HashSet<&str> = NAMES.iter().copied().collect();
            let identifiers: HashSet<String> = natives
                .iter()
                .map(|native| names.resolve(native, length))
                .collect();
            assert_eq!(identifiers.len(), natives.len());
        }
    }

    #[test]
    fn long_names_are_truncated_and_suffixed() {
        let mut names = NameResolver::default();
        let first = names.resolve("Bip01 L Forearm Twist Helper Node", OBJECT_NAME_LENGTH);
        assert_eq!(first, "Bip01 L Forearm Twist");
        let second = names.resolve("Bip01 L Forearm Twist Helper Node 2", OBJECT_NAME_LENGTH);
        assert_eq!(second, "Bip01 L Forearm Tw.00");
        let third = names.resolve("Bip01 L Forearm Twist Helper Node 3", OBJECT_NAME_LENGTH);
        assert_eq!(third, "Bip01 L Forearm Tw.01");
        assert!(third.chars().count() <= OBJECT_NAME_LENGTH);
    }

    #[test]
    fn noise_prefix_is_stripped() {
        let mut names = NameResolver::default();
        assert_eq!(names.resolve("Tri Shield 0", OBJECT_NAME_LENGTH), "Shield 0");
        assert_eq!(names.resolve("Shield 0", OBJECT_NAME_LENGTH), "Shield 0.00");
        assert_eq!(names.lookup("Shield 0"), Some("Tri Shield 0"));
    }

    #[test]
    fn resolution_is_memoized() {
        let mut names = NameResolver::default();
        let first = names.resolve("Scene Root", OBJECT_NAME_LENGTH);
        let again = names.resolve("Scene Root", OBJECT_NAME_LENGTH);
        assert_eq!(first, again);
        assert_eq!(names.records().len(), 1);
        assert_eq!(names.records()[0].native, "Scene Root");
    }
}
