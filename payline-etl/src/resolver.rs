//! Reference resolver
//!
//! Maps free-text tokens from spreadsheets onto canonical reference ids.
//! Built once per run from the reference tables; the value is immutable and
//! shared behind an `Arc`. Reloading after new references are created
//! produces a fresh resolver.
//!
//! Matching order:
//! 1. Whitespace-stripped, case-folded exact match
//! 2. Substring containment in either direction (when fuzzy matching is
//!    enabled); the longest matching key wins, ties go to the first key in
//!    sorted order

use payline_common::db::models::{Category, Channel, Member};
use payline_common::db::table_schemas::{CATEGORIES, CHANNELS, MEMBERS, PROJECTS};
use payline_common::store::from_rows;
use payline_common::{Filter, Result, RowStore};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Reference kinds a token can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceKind {
    Member,
    Channel,
    Category,
    Project,
}

impl ReferenceKind {
    pub fn label(&self) -> &'static str {
        match self {
            ReferenceKind::Member => "member",
            ReferenceKind::Channel => "channel",
            ReferenceKind::Category => "category",
            ReferenceKind::Project => "project",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Token that matched no reference
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{token}'")]
pub struct NotFound {
    pub kind: ReferenceKind,
    pub token: String,
}

/// Project identity used for label-based relations
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRef {
    pub id: String,
    pub title: String,
}

/// Raw reference data the resolver is built from
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    pub members: Vec<Member>,
    pub channels: Vec<Channel>,
    pub categories: Vec<Category>,
    pub projects: Vec<ProjectRef>,
}

impl ReferenceTables {
    /// Read every reference table from the store
    pub async fn load(store: &dyn RowStore) -> Result<Self> {
        let members: Vec<Member> = from_rows(store.select(MEMBERS, &Filter::All).await?)?;
        let channels: Vec<Channel> = from_rows(store.select(CHANNELS, &Filter::All).await?)?;
        let categories: Vec<Category> = from_rows(store.select(CATEGORIES, &Filter::All).await?)?;

        let projects = store
            .select(PROJECTS, &Filter::All)
            .await?
            .into_iter()
            .filter_map(|row| {
                let id = row.get("id")?.as_str()?.to_string();
                let title = row.get("title")?.as_str()?.to_string();
                Some(ProjectRef { id, title })
            })
            .collect();

        Ok(Self {
            members,
            channels,
            categories,
            projects,
        })
    }
}

/// Normalize a token for matching: drop all whitespace, lowercase
pub fn normalize_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[derive(Debug, Default)]
struct KindIndex {
    /// normalized token -> id
    by_key: HashMap<String, String>,
    /// normalized keys, sorted, for containment scans
    keys: Vec<String>,
    /// id -> display name
    names: HashMap<String, String>,
}

impl KindIndex {
    fn add(&mut self, token: &str, id: &str) {
        let key = normalize_token(token);
        if key.is_empty() {
            return;
        }
        // First writer wins so duplicate names resolve deterministically
        self.by_key.entry(key).or_insert_with(|| id.to_string());
    }

    fn name(&mut self, id: &str, name: &str) {
        self.names.insert(id.to_string(), name.to_string());
    }

    fn finish(mut self) -> Self {
        self.keys = self.by_key.keys().cloned().collect();
        self.keys.sort();
        self
    }

    fn exact(&self, key: &str) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    fn containment(&self, key: &str) -> Option<&str> {
        let mut best: Option<&String> = None;
        for candidate in &self.keys {
            if candidate.chars().count() < 2 {
                continue;
            }
            if !(candidate.contains(key) || key.contains(candidate.as_str())) {
                continue;
            }
            // keys are sorted; equal-length ties keep the first key
            match best {
                Some(current) if candidate.chars().count() <= current.chars().count() => {}
                _ => best = Some(candidate),
            }
        }
        best.and_then(|k| self.exact(k))
    }
}

/// Immutable token -> id resolver
#[derive(Debug)]
pub struct ReferenceResolver {
    indexes: HashMap<ReferenceKind, KindIndex>,
    channels: HashMap<String, Channel>,
    fuzzy: bool,
}

impl ReferenceResolver {
    pub fn new(tables: ReferenceTables, fuzzy: bool) -> Self {
        let mut members = KindIndex::default();
        for member in &tables.members {
            members.add(&member.name, &member.id);
            members.add(&member.code, &member.id);
            members.name(&member.id, &member.name);
        }

        let mut channels = KindIndex::default();
        for channel in &tables.channels {
            channels.add(&channel.name, &channel.id);
            channels.name(&channel.id, &channel.name);
        }

        let mut categories = KindIndex::default();
        for category in &tables.categories {
            categories.add(&category.name, &category.id);
            categories.name(&category.id, &category.name);
        }

        let mut projects = KindIndex::default();
        for project in &tables.projects {
            projects.add(&project.title, &project.id);
            projects.name(&project.id, &project.title);
        }

        let mut indexes = HashMap::new();
        indexes.insert(ReferenceKind::Member, members.finish());
        indexes.insert(ReferenceKind::Channel, channels.finish());
        indexes.insert(ReferenceKind::Category, categories.finish());
        indexes.insert(ReferenceKind::Project, projects.finish());

        let channels = tables
            .channels
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        Self {
            indexes,
            channels,
            fuzzy,
        }
    }

    /// Load reference tables from the store and build a resolver
    pub async fn load(store: &dyn RowStore, fuzzy: bool) -> Result<Self> {
        let tables = ReferenceTables::load(store).await?;
        let resolver = Self::new(tables, fuzzy);
        debug!(
            members = resolver.len(ReferenceKind::Member),
            channels = resolver.len(ReferenceKind::Channel),
            categories = resolver.len(ReferenceKind::Category),
            projects = resolver.len(ReferenceKind::Project),
            "Reference resolver loaded"
        );
        Ok(resolver)
    }

    /// Resolve a token to a canonical id
    pub fn resolve(&self, kind: ReferenceKind, token: &str) -> std::result::Result<&str, NotFound> {
        let not_found = || NotFound {
            kind,
            token: token.trim().to_string(),
        };

        let key = normalize_token(token);
        if key.is_empty() {
            return Err(not_found());
        }
        let index = self.indexes.get(&kind).ok_or_else(not_found)?;

        if let Some(id) = index.exact(&key) {
            return Ok(id);
        }
        if self.fuzzy {
            if let Some(id) = index.containment(&key) {
                debug!(kind = %kind, token, id, "Resolved by containment");
                return Ok(id);
            }
        }
        Err(not_found())
    }

    /// Display name for an id
    pub fn name_of(&self, kind: ReferenceKind, id: &str) -> Option<&str> {
        self.indexes
            .get(&kind)
            .and_then(|index| index.names.get(id))
            .map(String::as_str)
    }

    /// Channel fee profile by id
    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.get(id)
    }

    /// Number of entities of a kind
    pub fn len(&self, kind: ReferenceKind) -> usize {
        self.indexes.get(&kind).map(|i| i.names.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.values().all(|i| i.names.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payline_common::db::models::FeeBase;
    use rust_decimal_macros::dec;

    fn member(id: &str, code: &str, name: &str) -> Member {
        Member {
            id: id.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            active: true,
        }
    }

    fn channel(id: &str, name: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: name.to_string(),
            ad_rate: dec!(0.10),
            program_rate: dec!(0.03),
            market_fee_rate: dec!(0.21),
            fee_base: FeeBase::Net,
        }
    }

    fn resolver(fuzzy: bool) -> ReferenceResolver {
        ReferenceResolver::new(
            ReferenceTables {
                members: vec![member("m1", "D01", "김 민수"), member("m2", "D02", "이서연")],
                channels: vec![channel("c1", "네이버 블로그"), channel("c2", "네이버"), channel("c3", "오늘의집")],
                categories: vec![Category {
                    id: "k1".to_string(),
                    name: "Residential".to_string(),
                }],
                projects: vec![ProjectRef {
                    id: "p1".to_string(),
                    title: "한남동 아파트".to_string(),
                }],
            },
            fuzzy,
        )
    }

    #[test]
    fn test_exact_match_ignores_whitespace_and_case() {
        let r = resolver(true);
        assert_eq!(r.resolve(ReferenceKind::Member, "김민수"), Ok("m1"));
        assert_eq!(r.resolve(ReferenceKind::Member, " d02 "), Ok("m2"));
        assert_eq!(r.resolve(ReferenceKind::Category, "residential"), Ok("k1"));
        assert_eq!(r.resolve(ReferenceKind::Project, "한남동아파트"), Ok("p1"));
    }

    #[test]
    fn test_exact_match_beats_containment() {
        let r = resolver(true);
        assert_eq!(r.resolve(ReferenceKind::Channel, "네이버"), Ok("c2"));
    }

    #[test]
    fn test_containment_prefers_longest_key() {
        let r = resolver(true);
        // Both "네이버" and "네이버블로그" are contained in the token
        assert_eq!(r.resolve(ReferenceKind::Channel, "네이버 블로그 광고"), Ok("c1"));
        // Token contained in a key
        assert_eq!(r.resolve(ReferenceKind::Channel, "오늘의"), Ok("c3"));
    }

    #[test]
    fn test_fuzzy_disabled_requires_exact() {
        let r = resolver(false);
        assert!(r.resolve(ReferenceKind::Channel, "오늘의").is_err());
    }

    #[test]
    fn test_unknown_token_is_not_found() {
        let r = resolver(true);
        let err = r.resolve(ReferenceKind::Channel, "숨고비교").unwrap_err();
        assert_eq!(err.kind, ReferenceKind::Channel);
        assert_eq!(err.token, "숨고비교");
        assert_eq!(err.to_string(), "unknown channel '숨고비교'");
        assert!(r.resolve(ReferenceKind::Member, "   ").is_err());
    }

    #[test]
    fn test_reverse_lookup() {
        let r = resolver(true);
        assert_eq!(r.name_of(ReferenceKind::Member, "m1"), Some("김 민수"));
        assert_eq!(r.channel("c1").map(|c| c.market_fee_rate), Some(dec!(0.21)));
        assert_eq!(r.len(ReferenceKind::Channel), 3);
        assert!(!r.is_empty());
    }
}
