//! Stage templates and alias resolution
//!
//! The runner reports stages under free-form job names that changed across its
//! revisions. A [`StageTemplate`] maps those names, case-insensitively, to a stable
//! 1-based ordinal. Every pipeline stores the [`TemplateVersion`] it was created
//! under, so old and new naming schemes resolve side by side.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// 1-based position of a stage within its template.
pub type StageOrdinal = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateVersion(pub u32);

impl std::fmt::Display for TemplateVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Source, Build, Tests, Docker, Deploy.
pub const FIVE_STAGE: TemplateVersion = TemplateVersion(1);
/// Dependencies through intrusion tests, lint split out, SonarQube added.
pub const SEVEN_STAGE: TemplateVersion = TemplateVersion(2);
/// Clone and install split apart.
pub const EIGHT_STAGE: TemplateVersion = TemplateVersion(3);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template {0} has no stages")]
    Empty(TemplateVersion),

    #[error("alias '{alias}' is claimed by stages {first} and {second} of template {version}")]
    OverlappingAlias {
        version: TemplateVersion,
        alias: String,
        first: StageOrdinal,
        second: StageOrdinal,
    },

    #[error("template {0} is already registered")]
    DuplicateVersion(TemplateVersion),
}

/// A named stage and the names the runner may report it under.
///
/// The display name is itself an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDefinition {
    pub name: String,
    pub aliases: Vec<String>,
}

impl StageDefinition {
    pub fn new(name: impl Into<String>, aliases: &[&str]) -> Self {
        Self {
            name: name.into(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// An ordered stage list with a validated alias table.
#[derive(Debug, Clone)]
pub struct StageTemplate {
    version: TemplateVersion,
    stages: Vec<StageDefinition>,
    lookup: HashMap<String, StageOrdinal>,
}

impl StageTemplate {
    /// Build a template; ordinals follow the order of `stages`, starting at 1.
    ///
    /// Fails if two different stages share an alias.
    pub fn new(
        version: TemplateVersion,
        stages: Vec<StageDefinition>,
    ) -> Result<Self, TemplateError> {
        if stages.is_empty() {
            return Err(TemplateError::Empty(version));
        }

        let mut lookup = HashMap::new();
        for (index, stage) in stages.iter().enumerate() {
            let ordinal = index as StageOrdinal + 1;
            let names = std::iter::once(&stage.name).chain(stage.aliases.iter());
            for alias in names.map(|n| normalize_alias(n)) {
                match lookup.get(&alias) {
                    Some(&first) if first != ordinal => {
                        return Err(TemplateError::OverlappingAlias {
                            version,
                            alias,
                            first,
                            second: ordinal,
                        });
                    }
                    Some(_) => {}
                    None => {
                        lookup.insert(alias, ordinal);
                    }
                }
            }
        }

        Ok(Self {
            version,
            stages,
            lookup,
        })
    }

    pub fn version(&self) -> TemplateVersion {
        self.version
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stages with their ordinals, in order.
    pub fn stages(&self) -> impl Iterator<Item = (StageOrdinal, &StageDefinition)> {
        self.stages
            .iter()
            .enumerate()
            .map(|(i, s)| (i as StageOrdinal + 1, s))
    }

    pub fn stage_name(&self, ordinal: StageOrdinal) -> Option<&str> {
        let index = (ordinal as usize).checked_sub(1)?;
        self.stages.get(index).map(|s| s.name.as_str())
    }

    /// Resolve a runner-reported name to an ordinal.
    pub fn resolve(&self, raw: &str) -> Option<StageOrdinal> {
        self.lookup.get(&normalize_alias(raw)).copied()
    }
}

fn normalize_alias(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// All known templates, keyed by version.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<TemplateVersion, StageTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the 5-, 7- and 8-stage templates.
    pub fn builtin() -> Result<Self, TemplateError> {
        let mut registry = Self::new();
        registry.register(five_stage()?)?;
        registry.register(seven_stage()?)?;
        registry.register(eight_stage()?)?;
        Ok(registry)
    }

    pub fn register(&mut self, template: StageTemplate) -> Result<(), TemplateError> {
        let version = template.version();
        if self.templates.contains_key(&version) {
            return Err(TemplateError::DuplicateVersion(version));
        }
        self.templates.insert(version, template);
        Ok(())
    }

    pub fn get(&self, version: TemplateVersion) -> Option<&StageTemplate> {
        self.templates.get(&version)
    }

    pub fn contains(&self, version: TemplateVersion) -> bool {
        self.templates.contains_key(&version)
    }

    pub fn versions(&self) -> impl Iterator<Item = TemplateVersion> + '_ {
        self.templates.keys().copied()
    }

    /// Resolve a stage name under a given template version.
    ///
    /// An unknown version resolves nothing.
    pub fn resolve(&self, version: TemplateVersion, raw: &str) -> Option<StageOrdinal> {
        self.get(version)?.resolve(raw)
    }
}

// =============================================================================
// Built-in templates
// =============================================================================

fn five_stage() -> Result<StageTemplate, TemplateError> {
    StageTemplate::new(
        FIVE_STAGE,
        vec![
            StageDefinition::new("Source", &["git-clone", "clone"]),
            StageDefinition::new("Build", &["npm-install", "dependencies"]),
            StageDefinition::new(
                "Tests",
                &["unit-tests", "npm-test", "eslint", "npm-lint", "lint"],
            ),
            StageDefinition::new("Docker", &["docker-build"]),
            StageDefinition::new("Deploy", &["kubernetes-prep"]),
        ],
    )
}

fn seven_stage() -> Result<StageTemplate, TemplateError> {
    StageTemplate::new(
        SEVEN_STAGE,
        vec![
            StageDefinition::new("Dependencies", &["git-clone", "clone", "npm-install"]),
            StageDefinition::new("Lint", &["eslint", "npm-lint"]),
            StageDefinition::new("Unit Tests", &["unit-tests", "tests", "npm-test"]),
            StageDefinition::new("SonarQube", &["sonar"]),
            StageDefinition::new("Docker Build", &["docker-build", "docker"]),
            StageDefinition::new("Deploy", &["kubernetes-prep"]),
            StageDefinition::new("Intrusion Tests", &["intrusion-tests", "intrusion"]),
        ],
    )
}

fn eight_stage() -> Result<StageTemplate, TemplateError> {
    StageTemplate::new(
        EIGHT_STAGE,
        vec![
            StageDefinition::new("Clone", &["git-clone"]),
            StageDefinition::new("Install", &["npm-install", "dependencies"]),
            StageDefinition::new("Lint", &["eslint", "npm-lint"]),
            StageDefinition::new("Unit Tests", &["unit-tests", "tests", "npm-test"]),
            StageDefinition::new("SonarQube", &["sonar"]),
            StageDefinition::new("Docker Build", &["docker-build", "build"]),
            StageDefinition::new("Deploy", &["kubernetes-prep"]),
            StageDefinition::new("Intrusion Tests", &["intrusion-tests", "intrusion"]),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_are_valid() {
        let registry = TemplateRegistry::builtin().unwrap();
        assert_eq!(registry.get(FIVE_STAGE).unwrap().len(), 5);
        assert_eq!(registry.get(SEVEN_STAGE).unwrap().len(), 7);
        assert_eq!(registry.get(EIGHT_STAGE).unwrap().len(), 8);
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = TemplateRegistry::builtin().unwrap();
        assert_eq!(registry.resolve(SEVEN_STAGE, "NPM-LINT"), Some(2));
        assert_eq!(registry.resolve(SEVEN_STAGE, "eslint"), Some(2));
        assert_eq!(registry.resolve(SEVEN_STAGE, "  ESLint "), Some(2));
    }

    #[test]
    fn test_versions_resolve_independently() {
        let registry = TemplateRegistry::builtin().unwrap();
        assert_eq!(registry.resolve(FIVE_STAGE, "docker-build"), Some(4));
        assert_eq!(registry.resolve(SEVEN_STAGE, "docker-build"), Some(5));
        assert_eq!(registry.resolve(EIGHT_STAGE, "docker-build"), Some(6));
        assert_eq!(registry.resolve(EIGHT_STAGE, "build"), Some(6));
        assert_eq!(registry.resolve(FIVE_STAGE, "build"), Some(2));
    }

    #[test]
    fn test_display_name_is_an_alias() {
        let registry = TemplateRegistry::builtin().unwrap();
        assert_eq!(registry.resolve(EIGHT_STAGE, "sonarqube"), Some(5));
        assert_eq!(registry.resolve(EIGHT_STAGE, "Intrusion Tests"), Some(8));
    }

    #[test]
    fn test_unknown_name_or_version_is_unresolved() {
        let registry = TemplateRegistry::builtin().unwrap();
        assert_eq!(registry.resolve(FIVE_STAGE, "sonarqube"), None);
        assert_eq!(registry.resolve(TemplateVersion(99), "clone"), None);
    }

    #[test]
    fn test_overlapping_aliases_are_rejected() {
        let result = StageTemplate::new(
            TemplateVersion(7),
            vec![
                StageDefinition::new("Lint", &["eslint"]),
                StageDefinition::new("Check", &["ESLINT"]),
            ],
        );

        assert_eq!(
            result.unwrap_err(),
            TemplateError::OverlappingAlias {
                version: TemplateVersion(7),
                alias: "eslint".to_string(),
                first: 1,
                second: 2,
            }
        );
    }

    #[test]
    fn test_repeated_alias_within_one_stage_is_fine() {
        let template = StageTemplate::new(
            TemplateVersion(7),
            vec![StageDefinition::new("Docker", &["docker", "DOCKER"])],
        )
        .unwrap();
        assert_eq!(template.resolve("docker"), Some(1));
    }

    #[test]
    fn test_duplicate_version_is_rejected() {
        let mut registry = TemplateRegistry::builtin().unwrap();
        let again = StageTemplate::new(FIVE_STAGE, vec![StageDefinition::new("Only", &[])]).unwrap();
        assert_eq!(
            registry.register(again).unwrap_err(),
            TemplateError::DuplicateVersion(FIVE_STAGE)
        );
    }

    #[test]
    fn test_stage_name_by_ordinal() {
        let registry = TemplateRegistry::builtin().unwrap();
        let five = registry.get(FIVE_STAGE).unwrap();
        assert_eq!(five.stage_name(1), Some("Source"));
        assert_eq!(five.stage_name(5), Some("Deploy"));
        assert_eq!(five.stage_name(0), None);
        assert_eq!(five.stage_name(6), None);
    }
}
