use serde::{Deserialize, Serialize};
use troupe_config::RoleConfig;

/// Who an agent is. Fixed for the lifetime of its runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Stable identifier, also the key in shared memory.
    pub role: String,
    /// Display name used in prompts.
    pub title: String,
    pub goal: String,
    pub backstory: String,
}

impl AgentIdentity {
    pub fn new(role: &str, title: &str, goal: &str, backstory: &str) -> Self {
        Self {
            role: role.into(),
            title: title.into(),
            goal: goal.into(),
            backstory: backstory.into(),
        }
    }

    /// Title if set, otherwise the role id.
    pub fn display_name(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.role
        } else {
            &self.title
        }
    }
}

/// A roster entry: identity plus the task it runs when the whole team is asked
/// to work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub identity: AgentIdentity,
    pub standing_task: Option<String>,
}

impl From<&RoleConfig> for RoleSpec {
    fn from(cfg: &RoleConfig) -> Self {
        Self {
            identity: AgentIdentity::new(&cfg.role, &cfg.title, &cfg.goal, &cfg.backstory),
            standing_task: cfg.standing_task.clone().filter(|t| !t.trim().is_empty()),
        }
    }
}

fn spec(role: &str, title: &str, goal: &str, backstory: &str, task: &str) -> RoleSpec {
    RoleSpec {
        identity: AgentIdentity::new(role, title, goal, backstory),
        standing_task: Some(task.into()),
    }
}

/// The default eleven-member team.
pub fn builtin_roster() -> Vec<RoleSpec> {
    vec![
        spec(
            "chiefArchitect",
            "Chief Architect",
            "Design and oversee the implementation of robust, scalable, and maintainable software architectures",
            "You are an experienced Chief Architect with expertise in designing complex software systems. \
             You excel at creating scalable architectures, making technical decisions, and ensuring system quality. \
             Your role is to guide the technical direction of projects and ensure architectural consistency.",
            "Design the microservices architecture.",
        ),
        spec(
            "frontendEngineer",
            "Frontend Engineer",
            "Develop responsive and accessible web interfaces.",
            "Expert in modern frontend frameworks like React, Next.js, and UI/UX best practices.",
            "Develop the frontend using Next.js.",
        ),
        spec(
            "backendEngineer",
            "Backend Engineer",
            "Design and implement robust, scalable API services and databases.",
            "Expert in backend technologies, API design, and database optimization.",
            "Create backend APIs for data handling.",
        ),
        spec(
            "devopsEngineer",
            "DevOps Engineer",
            "Manage CI/CD, cloud infrastructure, and monitoring.",
            "Expert in cloud services, automation, and security best practices.",
            "Set up CI/CD pipelines.",
        ),
        spec(
            "aiMlEngineer",
            "AI/ML Engineer",
            "Design and implement machine learning and AI solutions.",
            "Expert in machine learning algorithms, neural networks, and data science.",
            "Implement AI-based recommendations.",
        ),
        spec(
            "productManager",
            "Product Manager",
            "Define product strategy, requirements, and roadmap.",
            "Expert in product management, user research, and agile methodologies.",
            "Define project scope and requirements.",
        ),
        spec(
            "uiUxDesigner",
            "UI/UX Designer",
            "Design intuitive and user-friendly interfaces.",
            "Expert in user research, wireframing, and prototyping.",
            "Design user-friendly UI mockups.",
        ),
        spec(
            "technicalWriter",
            "Technical Writer",
            "Create clear and comprehensive technical documentation.",
            "Expert in technical writing, documentation, and knowledge management.",
            "Write documentation and guides.",
        ),
        spec(
            "customerSuccess",
            "Customer Success Manager",
            "Ensure customer satisfaction and successful product adoption.",
            "Expert in customer support, onboarding, and relationship management.",
            "Ensure customer onboarding and support.",
        ),
        spec(
            "legalCompliance",
            "Legal & Compliance Officer",
            "Ensure legal compliance and data protection.",
            "Expert in legal requirements, data privacy, and regulatory compliance.",
            "Ensure project follows regulations.",
        ),
        spec(
            "marketingSales",
            "Marketing & Sales Lead",
            "Handle B2B outreach & sales strategy.",
            "Expert in digital marketing, lead generation, and enterprise sales.",
            "Create marketing campaigns.",
        ),
    ]
}

/// Roster from config, or the built-in one when config declares none.
pub fn roster_from_config(roles: &[RoleConfig]) -> Vec<RoleSpec> {
    if roles.is_empty() {
        builtin_roster()
    } else {
        roles.iter().map(RoleSpec::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn builtin_roster_has_eleven_unique_roles() {
        let roster = builtin_roster();
        assert_eq!(roster.len(), 11);
        let roles: HashSet<_> = roster.iter().map(|r| r.identity.role.as_str()).collect();
        assert_eq!(roles.len(), 11);
        assert!(roster.iter().all(|r| r.standing_task.is_some()));
    }

    #[test]
    fn config_roster_overrides_builtin() {
        let roles = vec![RoleConfig {
            role: "architect".into(),
            title: String::new(),
            goal: "Design systems".into(),
            backstory: String::new(),
            standing_task: Some("  ".into()),
        }];
        let roster = roster_from_config(&roles);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].identity.display_name(), "architect");
        assert!(roster[0].standing_task.is_none());
        assert_eq!(roster_from_config(&[]).len(), 11);
    }
}
