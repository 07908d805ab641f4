//! Boot script composition
//!
//! A node's first-boot behavior is built from [`ScriptFragment`]s, each naming
//! a remotely hosted installer. [`compose`] turns an ordered list of fragments
//! into a single shell program that installs the `runurl` tool and then runs
//! every fragment through it, in order.

pub mod registry;
pub mod steps;

pub use registry::ScriptRegistry;
pub use steps::{InstallStep, InstallSteps};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::LaunchError;

/// Host serving the standard installer scripts
pub const DEFAULT_BASE_URL: &str = "cloudera-tom.s3.amazonaws.com/";

/// Statement fetching the remote-script runner
pub const RUNURL_FETCH: &str = "wget -qO/usr/bin/runurl run.alestic.com/runurl";

/// Statement making the remote-script runner executable
pub const RUNURL_CHMOD: &str = "chmod 755 /usr/bin/runurl";

const SCRIPT_HEADER: &str = "#!/bin/bash
set +u
shopt -s xpg_echo
shopt -s expand_aliases
export PATH=/usr/ucb/bin:/bin:/sbin:/usr/bin:/usr/sbin
";

/// Normalize a base URL so it always ends with exactly the separator `/`.
///
/// A missing or empty base URL falls back to [`DEFAULT_BASE_URL`].
/// Normalizing an already normalized URL returns it unchanged.
pub fn normalize_base_url(base_url: Option<&str>) -> String {
    match base_url.map(str::trim) {
        None | Some("") => DEFAULT_BASE_URL.to_string(),
        Some(url) if url.ends_with('/') => url.to_string(),
        Some(url) => format!("{}/", url),
    }
}

/// One remote installer invocation: base URL, relative path and arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawFragment")]
pub struct ScriptFragment {
    base_url: String,
    path: String,
    args: Vec<String>,
}

/// Fragment as written in configuration files
#[derive(Deserialize)]
struct RawFragment {
    base_url: Option<String>,
    path: String,
    #[serde(default)]
    args: Vec<String>,
}

impl From<RawFragment> for ScriptFragment {
    fn from(raw: RawFragment) -> Self {
        ScriptFragment::new(raw.path)
            .with_base_url(raw.base_url.as_deref())
            .with_args(raw.args)
    }
}

impl ScriptFragment {
    /// Create a fragment served from [`DEFAULT_BASE_URL`] with no arguments
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            path: path.into(),
            args: Vec::new(),
        }
    }

    /// Serve the script from another host; `None` keeps the default host
    pub fn with_base_url(mut self, base_url: Option<&str>) -> Self {
        self.base_url = normalize_base_url(base_url);
        self
    }

    /// Append arguments to the invocation
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Reject fragments that could never resolve to a script
    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.path.trim().is_empty() {
            return Err(LaunchError::Config(format!(
                "script fragment under {} has an empty path",
                self.base_url
            )));
        }
        Ok(())
    }

    /// Render the `runurl` target: `base_url + path`, then the space-joined arguments
    pub fn render(&self) -> String {
        let mut line = format!("{}{}", self.base_url, self.path);
        if !self.args.is_empty() {
            line.push(' ');
            line.push_str(&self.args.join(" "));
        }
        line
    }
}

impl fmt::Display for ScriptFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// A rendered shell program, handed to the provider as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootScript(String);

impl BootScript {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Statements following the shell header, in execution order
    pub fn statements(&self) -> Vec<&str> {
        self.0
            .strip_prefix(SCRIPT_HEADER)
            .unwrap_or(&self.0)
            .lines()
            .filter(|line| !line.is_empty() && *line != "exit 0")
            .collect()
    }
}

impl fmt::Display for BootScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The statement list for `fragments`: the `runurl` preamble, then one
/// `runurl` call per fragment in input order
pub fn statements(fragments: &[ScriptFragment]) -> Vec<String> {
    let mut statements = Vec::with_capacity(fragments.len() + 2);
    statements.push(RUNURL_FETCH.to_string());
    statements.push(RUNURL_CHMOD.to_string());
    statements.extend(fragments.iter().map(|f| format!("runurl {}", f.render())));
    statements
}

/// Compose fragments into a boot script. Fragments are neither reordered nor
/// deduplicated.
pub fn compose(fragments: &[ScriptFragment]) -> BootScript {
    let mut script = String::from(SCRIPT_HEADER);
    for statement in statements(fragments) {
        script.push_str(&statement);
        script.push('\n');
    }
    script.push_str("exit 0\n");
    BootScript(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url(None), DEFAULT_BASE_URL);
        assert_eq!(normalize_base_url(Some("")), DEFAULT_BASE_URL);
        assert_eq!(normalize_base_url(Some("example.com")), "example.com/");
        assert_eq!(normalize_base_url(Some("example.com/")), "example.com/");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for url in ["example.com", "example.com/", "a.b/c", "x/y/"] {
            let once = normalize_base_url(Some(url));
            let twice = normalize_base_url(Some(&once));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_render_without_args() {
        let fragment = ScriptFragment::new("sun/java/install");
        assert_eq!(
            fragment.render(),
            "cloudera-tom.s3.amazonaws.com/sun/java/install"
        );
    }

    #[test]
    fn test_render_with_args() {
        let fragment = ScriptFragment::new("apache/hadoop/install")
            .with_base_url(Some("scripts.example.org"))
            .with_args(["nn,jt", "-c", "ec2"]);
        assert_eq!(
            fragment.render(),
            "scripts.example.org/apache/hadoop/install nn,jt -c ec2"
        );
        assert_eq!(fragment.to_string(), fragment.render());
    }

    #[test]
    fn test_render_is_pure() {
        let fragment = ScriptFragment::new("p").arg("a").arg("b");
        assert_eq!(fragment.render(), fragment.render());
        let rebased = fragment.clone().with_base_url(Some(fragment.base_url()));
        assert_eq!(rebased.render(), fragment.render());
    }

    #[test]
    fn test_validate_rejects_empty_path() {
        assert!(ScriptFragment::new("  ").validate().is_err());
        assert!(ScriptFragment::new("x/install").validate().is_ok());
    }

    #[test]
    fn test_compose_preamble_then_fragments_in_order() {
        let fragments = vec![
            ScriptFragment::new("one"),
            ScriptFragment::new("two").arg("2"),
            ScriptFragment::new("three"),
        ];
        let script = compose(&fragments);
        let statements = script.statements();

        assert_eq!(statements.len(), 5);
        assert_eq!(statements[0], RUNURL_FETCH);
        assert_eq!(statements[1], RUNURL_CHMOD);
        assert_eq!(statements[2], "runurl cloudera-tom.s3.amazonaws.com/one");
        assert_eq!(statements[3], "runurl cloudera-tom.s3.amazonaws.com/two 2");
        assert_eq!(statements[4], "runurl cloudera-tom.s3.amazonaws.com/three");
        assert!(script.as_str().starts_with("#!/bin/bash\n"));
        assert!(script.as_str().ends_with("exit 0\n"));
    }

    #[test]
    fn test_compose_keeps_duplicates() {
        let fragment = ScriptFragment::new("dup");
        let script = compose(&[fragment.clone(), fragment]);
        assert_eq!(script.statements().len(), 4);
    }

    #[test]
    fn test_compose_empty() {
        let script = compose(&[]);
        assert_eq!(script.statements(), vec![RUNURL_FETCH, RUNURL_CHMOD]);
    }

    #[test]
    fn test_fragment_from_yaml() {
        let yaml = "path: extra/install\nargs: [a, b]\n";
        let fragment: ScriptFragment = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(fragment.base_url(), DEFAULT_BASE_URL);
        assert_eq!(fragment.args(), ["a", "b"]);

        let yaml = "base_url: mirror.local\npath: x\n";
        let fragment: ScriptFragment = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(fragment.render(), "mirror.local/x");
    }
}
