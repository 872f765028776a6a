//! WorkingMemory - named stuff store with an alias layer
//!
//! Root entries are `Arc<Stuff>`, so cloning a memory gives a cheap
//! copy-on-write branch view: concurrent branches each get their own clone
//! and never share a mutable instance.
//!
//! Aliases are checked when written (cycle and hop limit), so reads follow a
//! chain that is known to terminate.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::error::{PipeError, Result};
use crate::stuff::{snake_case, ImageContent, Stuff, StuffContent, StructuredContent};
use crate::util::{jsonpath, MAIN_STUFF_NAME, MAX_ALIAS_HOPS};

/// Named store of stuff for one pipeline run (or one isolated branch)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkingMemory {
    root: BTreeMap<String, Arc<Stuff>>,
    aliases: BTreeMap<String, String>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory holding the given stuffs under their own names
    pub fn from_stuffs(stuffs: impl IntoIterator<Item = Stuff>) -> Result<Self> {
        let mut memory = Self::new();
        for stuff in stuffs {
            let name = stuff
                .stuff_name
                .clone()
                .unwrap_or_else(|| snake_case(&stuff.concept.code));
            memory.add_new_stuff(&name, stuff)?;
        }
        Ok(memory)
    }

    // ═══════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════

    /// Insert (or replace) a root entry.
    ///
    /// An alias of the same name is dropped: root keys win.
    pub fn add_new_stuff(&mut self, name: &str, stuff: impl Into<Arc<Stuff>>) -> Result<()> {
        if name == MAIN_STUFF_NAME {
            return Err(PipeError::NameConflict {
                name: name.to_string(),
                reason: "reserved for the main stuff alias".to_string(),
            });
        }
        let mut stuff: Arc<Stuff> = stuff.into();
        if stuff.stuff_name.as_deref() != Some(name) {
            stuff = Arc::new(stuff.renamed(name));
        }
        self.aliases.remove(name);
        trace!(name, concept = %stuff.concept, "stuff stored");
        self.root.insert(name.to_string(), stuff);
        Ok(())
    }

    /// Insert stuff and re-point `main_stuff` at it.
    ///
    /// Without an explicit name, the stuff's own name is used, else one is
    /// derived from its concept code (`ProductSummary` → `product_summary`,
    /// then `product_summary_2`, ...). Returns the name used.
    pub fn set_new_main_stuff(
        &mut self,
        stuff: impl Into<Arc<Stuff>>,
        name: Option<&str>,
    ) -> Result<String> {
        let stuff: Arc<Stuff> = stuff.into();
        let name = match name.or(stuff.stuff_name.as_deref()) {
            Some(name) => name.to_string(),
            None => self.free_name(&snake_case(&stuff.concept.code)),
        };
        self.add_new_stuff(&name, stuff)?;
        self.aliases
            .insert(MAIN_STUFF_NAME.to_string(), name.clone());
        Ok(name)
    }

    fn free_name(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Point `alias` at `target` (a root name or another alias)
    pub fn set_alias(&mut self, alias: &str, target: &str) -> Result<()> {
        if self.root.contains_key(alias) {
            return Err(PipeError::NameConflict {
                name: alias.to_string(),
                reason: "already a stuff name and cannot become an alias".to_string(),
            });
        }

        let mut chain = vec![alias.to_string(), target.to_string()];
        let mut current = target.to_string();
        loop {
            if current == alias {
                return Err(PipeError::AliasCycle {
                    alias: alias.to_string(),
                    chain: chain.join(" → "),
                });
            }
            if self.root.contains_key(&current) {
                break;
            }
            let Some(next) = self.aliases.get(&current) else {
                return Err(PipeError::StuffNotFound { name: current });
            };
            if chain.len() > MAX_ALIAS_HOPS {
                return Err(PipeError::AliasTooDeep {
                    alias: alias.to_string(),
                    max_hops: MAX_ALIAS_HOPS,
                });
            }
            chain.push(next.clone());
            current = next.clone();
        }

        self.aliases.insert(alias.to_string(), target.to_string());
        Ok(())
    }

    /// Re-point `main_stuff` at an existing name
    pub fn set_main_stuff_name(&mut self, name: &str) -> Result<()> {
        let root_name = self.resolve_name(name)?.to_string();
        self.aliases.insert(MAIN_STUFF_NAME.to_string(), root_name);
        Ok(())
    }

    /// Remove a root entry and every alias pointing directly at it
    pub fn remove_stuff(&mut self, name: &str) -> Option<Arc<Stuff>> {
        let removed = self.root.remove(name)?;
        self.aliases.retain(|_, target| target != name);
        Some(removed)
    }

    // ═══════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════

    /// Follow aliases to a root name
    pub fn resolve_name<'a>(&'a self, name: &'a str) -> Result<&'a str> {
        let mut current = name;
        for _ in 0..=MAX_ALIAS_HOPS {
            if let Some((key, _)) = self.root.get_key_value(current) {
                return Ok(key.as_str());
            }
            match self.aliases.get(current) {
                Some(target) => current = target,
                None => break,
            }
        }
        Err(PipeError::StuffNotFound {
            name: name.to_string(),
        })
    }

    pub fn get_stuff(&self, name: &str) -> Result<Arc<Stuff>> {
        let root_name = self.resolve_name(name)?;
        self.root
            .get(root_name)
            .map(Arc::clone)
            .ok_or_else(|| PipeError::StuffNotFound {
                name: name.to_string(),
            })
    }

    /// Borrowed view of a stuff
    pub fn stuff_ref(&self, name: &str) -> Result<&Stuff> {
        let root_name = self.resolve_name(name)?;
        self.root
            .get(root_name)
            .map(Arc::as_ref)
            .ok_or_else(|| PipeError::StuffNotFound {
                name: name.to_string(),
            })
    }

    pub fn get_optional_stuff(&self, name: &str) -> Option<Arc<Stuff>> {
        self.get_stuff(name).ok()
    }

    pub fn get_main_stuff(&self) -> Result<Arc<Stuff>> {
        self.get_stuff(MAIN_STUFF_NAME)
    }

    /// Name `main_stuff` currently resolves to
    pub fn main_stuff_name(&self) -> Option<&str> {
        self.resolve_name(MAIN_STUFF_NAME).ok()
    }

    pub fn get_stuff_as_str(&self, name: &str) -> Result<&str> {
        self.stuff_ref(name)?.as_str()
    }

    pub fn get_stuff_as_number(&self, name: &str) -> Result<f64> {
        self.stuff_ref(name)?.as_number()
    }

    pub fn get_stuff_as_image(&self, name: &str) -> Result<&ImageContent> {
        self.stuff_ref(name)?.as_image()
    }

    pub fn get_stuff_as_list(&self, name: &str) -> Result<&[StuffContent]> {
        self.stuff_ref(name)?.as_list()
    }

    pub fn get_stuff_as_structured(&self, name: &str) -> Result<&StructuredContent> {
        self.stuff_ref(name)?.as_structured()
    }

    /// Resolve `stuff.field[0].sub` to a JSON value
    pub fn resolve_path(&self, path: &str) -> Result<Value> {
        let parsed = jsonpath::parse_stuff_path(path)?;
        let stuff = self.stuff_ref(&parsed.stuff_name)?;
        let value = stuff.content.to_json();
        jsonpath::apply(&value, &parsed.segments)
            .cloned()
            .ok_or_else(|| PipeError::StuffNotFound {
                name: path.to_string(),
            })
    }

    /// Whether a root name or alias exists
    pub fn contains(&self, name: &str) -> bool {
        self.root.contains_key(name) || self.aliases.contains_key(name)
    }

    /// Root names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.root.keys().map(String::as_str)
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(a, t)| (a.as_str(), t.as_str()))
    }

    /// Root entries, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Stuff>)> {
        self.root.iter().map(|(name, stuff)| (name.as_str(), stuff))
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::{Concept, NativeConceptCode};
    use serde_json::json;

    fn text(name: Option<&str>, value: &str) -> Stuff {
        Stuff {
            stuff_code: format!("code_{value}"),
            stuff_name: name.map(str::to_string),
            concept: Arc::new(Concept::native(NativeConceptCode::Text)),
            content: StuffContent::text(value),
        }
    }

    #[test]
    fn main_stuff_and_name_resolve_to_same_stuff() {
        let mut memory = WorkingMemory::new();
        memory.set_new_main_stuff(text(None, "hi"), Some("x")).unwrap();

        let by_alias = memory.get_stuff("main_stuff").unwrap();
        let by_name = memory.get_stuff("x").unwrap();
        assert!(Arc::ptr_eq(&by_alias, &by_name));
        assert_eq!(memory.main_stuff_name(), Some("x"));
    }

    #[test]
    fn autogenerated_names_come_from_concept_code() {
        let mut memory = WorkingMemory::new();
        let first = memory.set_new_main_stuff(text(None, "a"), None).unwrap();
        let second = memory.set_new_main_stuff(text(None, "b"), None).unwrap();
        assert_eq!(first, "text");
        assert_eq!(second, "text_2");
        assert_eq!(memory.get_stuff_as_str("main_stuff").unwrap(), "b");
    }

    #[test]
    fn missing_stuff_is_an_error() {
        let memory = WorkingMemory::new();
        let err = memory.get_stuff("nope").unwrap_err();
        assert!(matches!(err, PipeError::StuffNotFound { .. }));
    }

    #[test]
    fn alias_cycle_rejected_at_write() {
        let mut memory = WorkingMemory::new();
        memory.add_new_stuff("doc", text(None, "d")).unwrap();
        memory.set_alias("a", "doc").unwrap();
        memory.set_alias("b", "a").unwrap();
        assert_eq!(memory.get_stuff_as_str("b").unwrap(), "d");

        // a → b → a
        let err = memory.set_alias("a", "b").unwrap_err();
        assert!(matches!(err, PipeError::AliasCycle { .. }));
        assert_eq!(memory.get_stuff_as_str("a").unwrap(), "d");
    }

    #[test]
    fn self_alias_is_a_cycle() {
        let mut memory = WorkingMemory::new();
        let err = memory.set_alias("loop", "loop").unwrap_err();
        assert!(matches!(err, PipeError::AliasCycle { .. }));
    }

    #[test]
    fn alias_cannot_shadow_root_name() {
        let mut memory = WorkingMemory::new();
        memory.add_new_stuff("doc", text(None, "d")).unwrap();
        memory.add_new_stuff("other", text(None, "o")).unwrap();
        let err = memory.set_alias("doc", "other").unwrap_err();
        assert!(matches!(err, PipeError::NameConflict { .. }));
    }

    #[test]
    fn main_stuff_name_is_reserved() {
        let mut memory = WorkingMemory::new();
        let err = memory.add_new_stuff("main_stuff", text(None, "x")).unwrap_err();
        assert!(matches!(err, PipeError::NameConflict { .. }));
    }

    #[test]
    fn typed_getter_reports_mismatch() {
        let mut memory = WorkingMemory::new();
        memory.add_new_stuff("doc", text(None, "d")).unwrap();
        let err = memory.get_stuff_as_list("doc").unwrap_err();
        assert!(matches!(err, PipeError::StuffTypeMismatch { .. }));
    }

    #[test]
    fn resolve_path_into_structured_content() {
        let mut memory = WorkingMemory::new();
        let mut stuff = text(None, "x");
        stuff.content = StuffContent::structured("Review", json!({"verdict": {"label": "ok"}}));
        memory.add_new_stuff("review", stuff).unwrap();
        memory.set_main_stuff_name("review").unwrap();

        assert_eq!(memory.resolve_path("review.verdict.label").unwrap(), "ok");
        assert_eq!(memory.resolve_path("main_stuff.verdict.label").unwrap(), "ok");
        assert!(memory.resolve_path("review.missing").is_err());
    }

    #[test]
    fn clone_is_an_isolated_view() {
        let mut memory = WorkingMemory::new();
        memory.add_new_stuff("doc", text(None, "d")).unwrap();

        let mut branch = memory.clone();
        branch.add_new_stuff("extra", text(None, "e")).unwrap();

        assert!(!memory.contains("extra"));
        assert!(Arc::ptr_eq(
            &memory.get_stuff("doc").unwrap(),
            &branch.get_stuff("doc").unwrap()
        ));
    }

    #[test]
    fn stored_stuff_carries_its_name() {
        let mut memory = WorkingMemory::new();
        memory.add_new_stuff("doc", text(Some("old"), "d")).unwrap();
        assert_eq!(memory.get_stuff("doc").unwrap().stuff_name.as_deref(), Some("doc"));
    }
}
