//! boardroom - sequential multi-agent LLM pipeline
//!
//! Role-specialised agents run one after another, each seeing everything
//! produced before it. Two decision gates guard a governed project run: a
//! Kill Switch screening and a Board of Directors strategy session.
//!
//! # Overview
//!
//! - [`roles`]: the fifteen roles and their model tiers
//! - [`task`]: builds a task descriptor for a role and purpose
//! - [`pipeline`]: runs descriptors in order and keeps the transcript
//! - [`gate`]: reads PASS/KILL and APPROVED/REJECTED/CONDITIONAL decisions
//! - [`governance`]: SCREENING, STRATEGY, PLANNING, BLUEPRINT, DONE
//! - [`session`]: lean and full research teams, A/B comparison, consultation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use boardroom::config::AppConfig;
//! use boardroom::llm::{CompletionGateway, GatewaySettings};
//! use boardroom::pipeline::PipelineRunner;
//! use boardroom::roles::RoleRegistry;
//! use boardroom::session::{self, TeamComposition};
//! use boardroom::testing::MockLlmProvider;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let provider = Arc::new(MockLlmProvider::single_response("# Report"));
//! let gateway = Arc::new(CompletionGateway::single(provider, GatewaySettings::default()));
//! let runner = PipelineRunner::new(gateway, "reports");
//! let registry = RoleRegistry::new(&config);
//!
//! let request = session::ResearchRequest::new("EV charging");
//! let transcript =
//!     session::run_research(&runner, &registry, TeamComposition::Lean, &request).await?;
//! println!("{}", session::final_report(&transcript).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod governance;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod roles;
pub mod search;
pub mod session;
pub mod task;
pub mod testing;

pub use config::AppConfig;
pub use error::{PipelineError, PipelineResult, RunFailure};
pub use gate::{evaluate, Decision, DecisionRecord, GateSchema};
pub use governance::{run_governed, GovernanceOutcome, GovernanceState};
pub use pipeline::{CancelFlag, PipelineRunner, PipelineTranscript, StageResult};
pub use roles::{Agent, Role, RoleId, RoleRegistry};
pub use task::{build_task, Purpose, TaskContext, TaskDescriptor};
