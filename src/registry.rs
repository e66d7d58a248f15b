//! Per-page element registry and stable ref assignment (spec.md §3, §4.8).
//!
//! Grounded on the teacher's `AgentRegistry` (`src/agent/registry.rs`) for
//! the keyed-map-of-mutable-entries shape, generalized from
//! `(connection_id, agent_number) -> AgentSession` to `ref -> RegistryEntry`
//! scoped to one page.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

const STALENESS_THRESHOLD: Duration = Duration::from_secs(60);
const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Tuple used both to generate a ref and to compare observations for
/// identity (spec.md §3 "Element Identity").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementIdentity {
    pub test_id: Option<String>,
    pub id: Option<String>,
    pub aria_label: Option<String>,
    pub role: String,
    pub name: Option<String>,
    pub tag_name: String,
    pub parent_role: Option<String>,
    pub sibling_index: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RefStability {
    Stable,
    New,
    Moved,
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub ref_id: String,
    pub selector: String,
    pub identity: ElementIdentity,
    pub last_seen: Instant,
    pub bounds: Option<(f64, f64, f64, f64)>,
}

/// Result of upserting one observed element into the registry.
pub struct UpsertOutcome {
    pub ref_id: String,
    pub stability: RefStability,
    pub previous_ref: Option<String>,
}

pub struct ElementRegistry {
    page_url: Option<String>,
    entries: HashMap<String, RegistryEntry>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self { page_url: None, entries: HashMap::new() }
    }

    /// Reset if the page URL changed or a refresh was requested, then evict
    /// stale entries. Must run before enumerating elements in a new
    /// observation (spec.md §4.8 steps 1-2).
    pub fn begin_observation(&mut self, page_url: &str, refresh_refs: bool, now: Instant) {
        if refresh_refs || self.page_url.as_deref() != Some(page_url) {
            self.entries.clear();
        }
        self.page_url = Some(page_url.to_string());
        self.entries.retain(|_, e| now.saturating_duration_since(e.last_seen) <= STALENESS_THRESHOLD);
    }

    /// Candidate ref derived from the priority chain: testId -> id ->
    /// ariaLabel -> hash of the full identity tuple.
    pub fn candidate_ref(identity: &ElementIdentity) -> String {
        if let Some(v) = &identity.test_id {
            return format!("@{}", normalize_attr(v));
        }
        if let Some(v) = &identity.id {
            return format!("@{}", normalize_attr(v));
        }
        if let Some(v) = &identity.aria_label {
            return format!("@{}", normalize_attr(v));
        }
        format!("@e{}", hash_identity(identity))
    }

    /// Insert or reuse an entry for a freshly observed element (spec.md
    /// §4.8 steps 4-7).
    pub fn upsert(
        &mut self,
        identity: ElementIdentity,
        selector: String,
        bounds: Option<(f64, f64, f64, f64)>,
        now: Instant,
        report_history: bool,
    ) -> UpsertOutcome {
        let candidate = Self::candidate_ref(&identity);

        let previous_ref = if report_history {
            self.entries
                .iter()
                .find(|(r, e)| **r != candidate && similarity(&e.identity, &identity) >= SIMILARITY_THRESHOLD)
                .map(|(r, _)| r.clone())
        } else {
            None
        };

        let (final_ref, stability) = match self.entries.get(&candidate) {
            Some(existing) if similarity(&existing.identity, &identity) >= SIMILARITY_THRESHOLD => {
                (candidate, RefStability::Stable)
            }
            Some(_) => {
                let mut index = 2;
                loop {
                    let alt = format!("{candidate}_{index}");
                    match self.entries.get(&alt) {
                        Some(existing) if similarity(&existing.identity, &identity) >= SIMILARITY_THRESHOLD => {
                            break (alt, RefStability::Stable);
                        }
                        Some(_) => index += 1,
                        None => break (alt, RefStability::New),
                    }
                }
            }
            None => (candidate, RefStability::New),
        };

        let stability = if previous_ref.is_some() { RefStability::Moved } else { stability };

        self.entries.insert(
            final_ref.clone(),
            RegistryEntry { ref_id: final_ref.clone(), selector, identity, last_seen: now, bounds },
        );

        UpsertOutcome { ref_id: final_ref, stability, previous_ref }
    }

    pub fn resolve(&self, ref_id: &str) -> Option<&RegistryEntry> {
        self.entries.get(ref_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ElementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_attr(raw: &str) -> String {
    let normalized: String = raw.chars().filter(|c| c.is_ascii_alphanumeric()).map(|c| c.to_ascii_lowercase()).collect();
    normalized.chars().take(12).collect()
}

fn hash_identity(identity: &ElementIdentity) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    identity.test_id.hash(&mut hasher);
    identity.id.hash(&mut hasher);
    identity.aria_label.hash(&mut hasher);
    identity.role.hash(&mut hasher);
    identity.name.hash(&mut hasher);
    identity.tag_name.hash(&mut hasher);
    identity.parent_role.hash(&mut hasher);
    identity.sibling_index.hash(&mut hasher);
    to_base36(hasher.finish())
}

fn to_base36(mut value: u64) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::with_capacity(6);
    for _ in 0..6 {
        out.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 alphabet is ascii")
}

/// Weighted-ratio similarity in [0,1]; fields earlier in the identity tuple
/// carry more weight since they're more likely to uniquely name an element.
fn similarity(a: &ElementIdentity, b: &ElementIdentity) -> f64 {
    let weighted = [
        (3.0, a.test_id == b.test_id),
        (3.0, a.id == b.id),
        (2.0, a.aria_label == b.aria_label),
        (2.0, a.role == b.role),
        (2.0, a.name == b.name),
        (1.0, a.tag_name == b.tag_name),
        (1.0, a.parent_role == b.parent_role),
        (1.0, a.sibling_index == b.sibling_index),
    ];
    let total: f64 = weighted.iter().map(|(w, _)| w).sum();
    let matched: f64 = weighted.iter().filter(|(_, eq)| *eq).map(|(w, _)| w).sum();
    matched / total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(test_id: Option<&str>, role: &str, name: &str) -> ElementIdentity {
        ElementIdentity {
            test_id: test_id.map(String::from),
            role: role.to_string(),
            name: Some(name.to_string()),
            tag_name: "button".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_id_takes_priority_for_ref_candidate() {
        let id = identity(Some("Submit-Button!"), "button", "Submit");
        assert_eq!(ElementRegistry::candidate_ref(&id), "@submitbutton");
    }

    #[test]
    fn falls_back_to_identity_hash_without_attrs() {
        let id = ElementIdentity { role: "button".into(), tag_name: "button".into(), ..Default::default() };
        let r = ElementRegistry::candidate_ref(&id);
        assert!(r.starts_with("@e"));
        assert_eq!(r.len(), 8);
    }

    #[test]
    fn reuses_ref_for_same_identity_marks_stable() {
        let mut reg = ElementRegistry::new();
        let now = Instant::now();
        reg.begin_observation("https://x.test", false, now);
        let id = identity(Some("submit"), "button", "Submit");
        let first = reg.upsert(id.clone(), "css:#submit".into(), None, now, false);
        assert_eq!(first.stability, RefStability::New);

        reg.begin_observation("https://x.test", false, now);
        let second = reg.upsert(id, "css:#submit".into(), None, now, false);
        assert_eq!(second.stability, RefStability::Stable);
        assert_eq!(second.ref_id, first.ref_id);
    }

    #[test]
    fn collision_between_different_identities_appends_index() {
        let mut reg = ElementRegistry::new();
        let now = Instant::now();
        reg.begin_observation("https://x.test", false, now);
        let id_a = ElementIdentity {
            test_id: Some("x".into()),
            role: "button".into(),
            name: Some("A".into()),
            tag_name: "button".into(),
            ..Default::default()
        };
        let id_b = ElementIdentity {
            test_id: Some("x".into()),
            role: "link".into(),
            name: Some("B".into()),
            tag_name: "a".into(),
            ..Default::default()
        };
        let a = reg.upsert(id_a, "css:#a".into(), None, now, false);
        let b = reg.upsert(id_b, "css:#b".into(), None, now, false);
        assert_ne!(a.ref_id, b.ref_id);
        assert_eq!(b.stability, RefStability::New);
    }

    #[test]
    fn page_navigation_resets_registry() {
        let mut reg = ElementRegistry::new();
        let now = Instant::now();
        reg.begin_observation("https://x.test/a", false, now);
        reg.upsert(identity(Some("submit"), "button", "Submit"), "css:#submit".into(), None, now, false);
        assert_eq!(reg.len(), 1);

        reg.begin_observation("https://x.test/b", false, now);
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn stale_entries_evicted_on_next_observe() {
        let mut reg = ElementRegistry::new();
        let t0 = Instant::now();
        reg.begin_observation("https://x.test", false, t0);
        reg.upsert(identity(Some("submit"), "button", "Submit"), "css:#submit".into(), None, t0, false);

        let t1 = t0 + Duration::from_secs(61);
        reg.begin_observation("https://x.test", false, t1);
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn moved_ref_reports_previous_ref_when_history_requested() {
        let mut reg = ElementRegistry::new();
        let now = Instant::now();
        reg.begin_observation("https://x.test", false, now);
        let id = identity(None, "button", "Submit");
        reg.upsert(id.clone(), "css:.old".into(), None, now, false);

        let moved_id = ElementIdentity { aria_label: Some("Different label".into()), ..id };
        let outcome = reg.upsert(moved_id, "css:.old".into(), None, now, true);
        assert!(outcome.previous_ref.is_some());
        assert_eq!(outcome.stability, RefStability::Moved);
    }
}
