//! Role registry
//!
//! The fifteen roles are fixed plain data: an id, a display name, a default
//! model tier and an instruction string. The registry binds each role's tier
//! to the configured model once per process and hands out [`Agent`] values
//! for a run.

use crate::config::{AppConfig, ModelsSection};
use crate::error::PipelineError;
use crate::llm::{ModelBinding, ModelTier};
use crate::prompts;
use std::collections::HashMap;
use std::fmt;

/// Every role the pipeline knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleId {
    Researcher,
    Analyst,
    Skeptic,
    Strategist,
    Writer,
    Ceo,
    Cfo,
    Cto,
    Cmo,
    Clo,
    ProjectManager,
    Designer,
    Backend,
    Frontend,
    Qa,
}

impl RoleId {
    pub const ALL: [RoleId; 15] = [
        RoleId::Researcher,
        RoleId::Analyst,
        RoleId::Skeptic,
        RoleId::Strategist,
        RoleId::Writer,
        RoleId::Ceo,
        RoleId::Cfo,
        RoleId::Cto,
        RoleId::Cmo,
        RoleId::Clo,
        RoleId::ProjectManager,
        RoleId::Designer,
        RoleId::Backend,
        RoleId::Frontend,
        RoleId::Qa,
    ];

    /// The five board seats, chair first
    pub const BOARD: [RoleId; 5] = [
        RoleId::Ceo,
        RoleId::Cfo,
        RoleId::Cto,
        RoleId::Cmo,
        RoleId::Clo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleId::Researcher => "researcher",
            RoleId::Analyst => "analyst",
            RoleId::Skeptic => "skeptic",
            RoleId::Strategist => "strategist",
            RoleId::Writer => "writer",
            RoleId::Ceo => "ceo",
            RoleId::Cfo => "cfo",
            RoleId::Cto => "cto",
            RoleId::Cmo => "cmo",
            RoleId::Clo => "clo",
            RoleId::ProjectManager => "project_manager",
            RoleId::Designer => "designer",
            RoleId::Backend => "backend",
            RoleId::Frontend => "frontend",
            RoleId::Qa => "qa",
        }
    }

    /// Parse a role id; case-insensitive, `-` and `_` are interchangeable
    pub fn from_id(id: &str) -> Option<Self> {
        let normalized = id.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|r| r.as_str() == normalized)
    }

    fn display_name(&self) -> &'static str {
        match self {
            RoleId::Researcher => "Deep Researcher",
            RoleId::Analyst => "Quant-X Data Analyst",
            RoleId::Skeptic => "Chief Skeptic",
            RoleId::Strategist => "Business Strategist",
            RoleId::Writer => "Strategic Writer",
            RoleId::Ceo => "CEO",
            RoleId::Cfo => "CFO",
            RoleId::Cto => "CTO",
            RoleId::Cmo => "CMO",
            RoleId::Clo => "CLO",
            RoleId::ProjectManager => "Project Manager",
            RoleId::Designer => "Designer",
            RoleId::Backend => "Backend Architect",
            RoleId::Frontend => "Frontend Architect",
            RoleId::Qa => "QA Engineer",
        }
    }

    // Raw fact gathering runs on the cheap tier; anything that arbitrates,
    // decides or writes the deliverable runs on the deep tier.
    fn default_tier(&self) -> ModelTier {
        match self {
            RoleId::Researcher | RoleId::Analyst => ModelTier::Fast,
            _ => ModelTier::Deep,
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            RoleId::Researcher => prompts::roles::RESEARCHER,
            RoleId::Analyst => prompts::roles::ANALYST,
            RoleId::Skeptic => prompts::roles::SKEPTIC,
            RoleId::Strategist => prompts::roles::STRATEGIST,
            RoleId::Writer => prompts::roles::WRITER,
            RoleId::Ceo => prompts::roles::CEO,
            RoleId::Cfo => prompts::roles::CFO,
            RoleId::Cto => prompts::roles::CTO,
            RoleId::Cmo => prompts::roles::CMO,
            RoleId::Clo => prompts::roles::CLO,
            RoleId::ProjectManager => prompts::roles::PROJECT_MANAGER,
            RoleId::Designer => prompts::roles::DESIGNER,
            RoleId::Backend => prompts::roles::BACKEND,
            RoleId::Frontend => prompts::roles::FRONTEND,
            RoleId::Qa => prompts::roles::QA,
        }
    }

    fn has_search_tool(&self) -> bool {
        matches!(self, RoleId::Researcher | RoleId::Clo)
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable role definition
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub id: RoleId,
    pub display_name: &'static str,
    pub model_tier: ModelTier,
    pub fixed_instruction: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub has_search_tool: bool,
}

/// A role bound to a concrete model for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub role: Role,
    pub model: ModelBinding,
    pub capabilities: Capabilities,
}

impl Agent {
    /// Speaker label, e.g. `CEO [Gemini Pro]`
    pub fn label(&self) -> String {
        format!("{} [{}]", self.role.display_name, self.model.display_name)
    }
}

/// Role table resolved against configuration
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: HashMap<RoleId, Role>,
    models: ModelsSection,
}

impl RoleRegistry {
    pub fn new(config: &AppConfig) -> Self {
        let roles = RoleId::ALL
            .into_iter()
            .map(|id| {
                let model_tier = config
                    .roles
                    .overrides
                    .iter()
                    .find(|(key, _)| RoleId::from_id(key) == Some(id))
                    .map(|(_, tier)| *tier)
                    .unwrap_or_else(|| id.default_tier());
                let role = Role {
                    id,
                    display_name: id.display_name(),
                    model_tier,
                    fixed_instruction: id.instruction(),
                };
                (id, role)
            })
            .collect();

        Self {
            roles,
            models: config.models.clone(),
        }
    }

    /// Look up a role by its string id
    pub fn get_role(&self, id: &str) -> Result<&Role, PipelineError> {
        RoleId::from_id(id)
            .and_then(|role_id| self.roles.get(&role_id))
            .ok_or_else(|| PipelineError::UnknownRole(id.to_string()))
    }

    pub fn role(&self, id: RoleId) -> &Role {
        // Every RoleId is inserted in `new`.
        &self.roles[&id]
    }

    /// Bind a role to its tier's configured model
    pub fn agent(&self, id: RoleId) -> Agent {
        let role = self.role(id).clone();
        let model = self.models.binding(role.model_tier);
        Agent {
            capabilities: Capabilities {
                has_search_tool: id.has_search_tool(),
            },
            role,
            model,
        }
    }

    /// Markdown list of board members with their model labels
    pub fn board_roster(&self) -> String {
        RoleId::BOARD
            .into_iter()
            .map(|id| format!("- {}", self.agent(id).label()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RoleRegistry {
        RoleRegistry::new(&AppConfig::default())
    }

    #[test]
    fn test_all_roles_registered() {
        let registry = registry();
        for id in RoleId::ALL {
            let role = registry.role(id);
            assert_eq!(role.id, id);
            assert!(!role.fixed_instruction.is_empty());
        }
    }

    #[test]
    fn test_get_role_by_string() {
        let registry = registry();
        assert_eq!(registry.get_role("CEO").unwrap().id, RoleId::Ceo);
        assert_eq!(
            registry.get_role("project-manager").unwrap().id,
            RoleId::ProjectManager
        );
    }

    #[test]
    fn test_unknown_role_fails() {
        let registry = registry();
        let result = registry.get_role("intern");
        assert!(matches!(result, Err(PipelineError::UnknownRole(id)) if id == "intern"));
    }

    #[test]
    fn test_tier_split() {
        let registry = registry();
        assert_eq!(registry.role(RoleId::Researcher).model_tier, ModelTier::Fast);
        assert_eq!(registry.role(RoleId::Analyst).model_tier, ModelTier::Fast);
        for id in [RoleId::Skeptic, RoleId::Writer, RoleId::Ceo, RoleId::Clo, RoleId::Backend] {
            assert_eq!(registry.role(id).model_tier, ModelTier::Deep);
        }
    }

    #[test]
    fn test_overrides_change_tier() {
        let mut config = AppConfig::default();
        config
            .roles
            .overrides
            .insert("skeptic".to_string(), ModelTier::Fast);
        let registry = RoleRegistry::new(&config);

        let agent = registry.agent(RoleId::Skeptic);
        assert_eq!(agent.model.tier, ModelTier::Fast);
        assert_eq!(agent.model.model, config.models.fast.model);
    }

    #[test]
    fn test_agent_binding_and_capabilities() {
        let registry = registry();
        let researcher = registry.agent(RoleId::Researcher);
        assert!(researcher.capabilities.has_search_tool);
        assert_eq!(researcher.model.model, "gemini-2.5-flash");

        let ceo = registry.agent(RoleId::Ceo);
        assert!(!ceo.capabilities.has_search_tool);
        assert_eq!(ceo.label(), "CEO [Gemini Pro]");
    }

    #[test]
    fn test_board_roster_lists_five_members() {
        let roster = registry().board_roster();
        assert_eq!(roster.lines().count(), 5);
        assert!(roster.starts_with("- CEO ["));
    }
}
