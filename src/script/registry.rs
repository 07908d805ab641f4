//! Hook points for caller-supplied boot script fragments
//!
//! Operators splice custom setup steps into the standard bootstrap sequence
//! by registering fragments under a label. Each orchestrator consults the
//! labels it knows about; other labels are kept but never read.

use tracing::debug;

use super::ScriptFragment;

/// Label for fragments run after all standard install steps
pub const DEFAULT_LABEL: &str = "DEFAULT";

/// Label for fragments run before the Java runtime is installed
pub const BEFORE_JAVA: &str = "BEFORE_JAVA";

/// Label for fragments run right after the Java runtime is installed
pub const AFTER_JAVA: &str = "AFTER_JAVA";

/// `BEFORE_<SERVICE>` label for a service, e.g. `BEFORE_HADOOP`
pub fn before(service: &str) -> String {
    format!("BEFORE_{}", service.to_uppercase())
}

/// `AFTER_<SERVICE>` label for a service, e.g. `AFTER_HADOOP`
pub fn after(service: &str) -> String {
    format!("AFTER_{}", service.to_uppercase())
}

/// Ordered label -> fragments mapping.
///
/// Labels keep their first-registration order and fragments keep their
/// insertion order. Registering under an existing label appends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptRegistry {
    entries: Vec<(String, Vec<ScriptFragment>)>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `fragments` to the list stored under `label`
    pub fn add<I>(&mut self, label: &str, fragments: I)
    where
        I: IntoIterator<Item = ScriptFragment>,
    {
        let fragments = fragments.into_iter();
        match self.entries.iter_mut().find(|(l, _)| l == label) {
            Some((_, existing)) => existing.extend(fragments),
            None => self.entries.push((label.to_string(), fragments.collect())),
        }
        debug!("Registered hook scripts under {}", label);
    }

    /// Append `fragments` under [`DEFAULT_LABEL`]
    pub fn add_default<I>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = ScriptFragment>,
    {
        self.add(DEFAULT_LABEL, fragments);
    }

    /// Append a single fragment under `label`
    pub fn add_one(&mut self, label: &str, fragment: ScriptFragment) {
        self.add(label, std::iter::once(fragment));
    }

    /// Append a single fragment under [`DEFAULT_LABEL`]
    pub fn add_default_one(&mut self, fragment: ScriptFragment) {
        self.add_one(DEFAULT_LABEL, fragment);
    }

    /// Copy of the fragments under `label`; empty when nothing is registered
    pub fn get(&self, label: &str) -> Vec<ScriptFragment> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, fragments)| fragments.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.iter().any(|(l, _)| l == label)
    }

    /// Registered labels in first-registration order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Interleave hooks with the two mandatory install fragments:
    ///
    /// `BEFORE_JAVA, runtime, AFTER_JAVA, BEFORE_<SERVICE>, service,
    /// AFTER_<SERVICE>, DEFAULT`
    pub fn around_install(
        &self,
        service: &str,
        runtime: ScriptFragment,
        install: ScriptFragment,
    ) -> Vec<ScriptFragment> {
        let mut sequence = self.get(BEFORE_JAVA);
        sequence.push(runtime);
        sequence.extend(self.get(AFTER_JAVA));
        sequence.extend(self.get(&before(service)));
        sequence.push(install);
        sequence.extend(self.get(&after(service)));
        sequence.extend(self.get(DEFAULT_LABEL));
        sequence
    }
}

impl<L, I> FromIterator<(L, I)> for ScriptRegistry
where
    L: AsRef<str>,
    I: IntoIterator<Item = ScriptFragment>,
{
    fn from_iter<T: IntoIterator<Item = (L, I)>>(iter: T) -> Self {
        let mut registry = ScriptRegistry::new();
        for (label, fragments) in iter {
            registry.add(label.as_ref(), fragments);
        }
        registry
    }
}
