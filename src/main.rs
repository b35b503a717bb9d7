//! boardroom - command line entry point
//!
//! Progress and logs go to stderr; the finished report goes to stdout.

use boardroom::config::{AppConfig, ConfigError, ModelConfig};
use boardroom::error::{sanitize_error_message, PipelineError, RunFailure};
use boardroom::governance::{run_governed, GovernanceState};
use boardroom::llm::provider::LlmProvider;
use boardroom::llm::{CompletionGateway, GatewaySettings, ModelTier};
use boardroom::observability::init_default_logging;
use boardroom::pipeline::{CancelFlag, PipelineRunner};
use boardroom::progress::ConsoleProgress;
use boardroom::roles::RoleRegistry;
use boardroom::search::{SearchProvider, SerperSearch};
use boardroom::session::{self, ResearchRequest, TeamComposition};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_TOPIC: &str = "AI agent market outlook 2026: key players, revenue models and risks";
const DEFAULT_IDEA: &str = "An AI-powered personal finance coach for freelancers";
const DEFAULT_QUESTION: &str = "Should the Kill Switch only block projects that are clearly \
    doomed (illegal activity, exact trademark match, zero market), or keep screening for \
    similar trademarks and saturated markets as well?";

/// Sequential multi-agent research and governance pipeline
#[derive(Parser)]
#[command(name = "boardroom")]
#[command(about = "Multi-agent research reports, kill-switch screening and board approval")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "BOARDROOM_CONFIG")]
    config: Option<PathBuf>,

    /// Print each stage's output as it completes
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce a research report on a topic
    Research {
        /// Topic; read from stdin when omitted
        topic: Option<String>,

        /// Team composition
        #[arg(long, value_enum, default_value_t = Team::Full)]
        team: Team,

        /// Expand the topic into a structured brief first
        #[arg(long)]
        refine: bool,

        /// Run the lean and full teams and combine both reports
        #[arg(long)]
        compare: bool,

        /// Description of an accompanying image
        #[arg(long)]
        vision: Option<String>,
    },
    /// Screen a project idea, put it to the board and produce a blueprint
    Govern {
        /// Project idea; read from stdin when omitted
        idea: Option<String>,
    },
    /// Ask the board a free-form question
    Consult {
        /// Question; read from stdin when omitted
        question: Option<String>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Team {
    Lean,
    Full,
}

impl From<Team> for TeamComposition {
    fn from(team: Team) -> Self {
        match team {
            Team::Lean => TeamComposition::Lean,
            Team::Full => TeamComposition::Full,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let code = execute(cli).await;
    process::exit(code);
}

async fn execute(cli: Cli) -> i32 {
    let (config, source) = match AppConfig::load(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => return report_error(&PipelineError::Config(e)),
    };
    match &source {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("No configuration file found, using defaults"),
    }

    if let Commands::Config { show } = cli.command {
        return handle_config_command(&config, source.as_deref(), show);
    }

    let components = match Components::build(&config) {
        Ok(components) => components,
        Err(e) => return report_error(&e),
    };

    let cancel = CancelFlag::new();
    spawn_interrupt_handler(cancel.clone());

    let runner = PipelineRunner::new(
        components.gateway.clone(),
        config.pipeline.output_dir.clone(),
    )
    .with_search(components.search.clone())
    .with_progress(Arc::new(ConsoleProgress::new(cli.verbose)))
    .with_cancel_flag(cancel);
    let registry = &components.registry;

    match cli.command {
        Commands::Research {
            topic,
            team,
            refine,
            compare,
            vision,
        } => {
            let topic = read_input(topic, DEFAULT_TOPIC);
            let team = if compare {
                TeamComposition::Full
            } else {
                team.into()
            };
            let mut request = ResearchRequest::new(&topic);
            if refine {
                let binding = config.models.binding(ModelTier::Fast);
                let brief =
                    session::refine_topic(&components.gateway, &binding, team, &topic).await;
                request = request.with_brief(brief);
            }
            if let Some(vision) = vision {
                request = request.with_vision(vision);
            }

            if compare {
                match session::compare(&runner, registry, &request).await {
                    Ok(report) => {
                        session::save_report(runner.output_dir(), &report).await;
                        println!("{}", report.to_markdown());
                        0
                    }
                    Err(failure) => report_failure(&failure),
                }
            } else {
                match session::run_research(&runner, registry, team, &request).await {
                    Ok(transcript) => {
                        println!("{}", session::final_report(&transcript).unwrap_or_default());
                        0
                    }
                    Err(failure) => report_failure(&failure),
                }
            }
        }
        Commands::Govern { idea } => {
            let idea = read_input(idea, DEFAULT_IDEA);
            match run_governed(&runner, registry, &idea).await {
                Ok(outcome) => {
                    match outcome.state {
                        GovernanceState::Terminated => {
                            if let Some(summary) = outcome.termination_summary() {
                                println!("{summary}\n");
                            }
                            println!("{}", outcome.transcript.to_markdown());
                        }
                        _ => {
                            if let Some(last) = outcome.transcript.last() {
                                println!("{}", last.raw_text);
                            }
                            match &outcome.blueprint_path {
                                Some(path) => eprintln!("Blueprint saved to {}", path.display()),
                                None => warn!("Blueprint was not saved to disk"),
                            }
                        }
                    }
                    0
                }
                Err(failure) => report_failure(&failure),
            }
        }
        Commands::Consult { question } => {
            let question = read_input(question, DEFAULT_QUESTION);
            match session::consult(&runner, registry, &question).await {
                Ok(transcript) => {
                    println!("{}", session::final_report(&transcript).unwrap_or_default());
                    0
                }
                Err(failure) => report_failure(&failure),
            }
        }
        Commands::Config { .. } => 0,
    }
}

/// Argument, else piped stdin, else the built-in default
fn read_input(arg: Option<String>, default: &str) -> String {
    if let Some(value) = arg.filter(|v| !v.trim().is_empty()) {
        return value;
    }
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        let mut buffer = String::new();
        match stdin.lock().read_to_string(&mut buffer) {
            Ok(_) if !buffer.trim().is_empty() => return buffer.trim().to_string(),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read stdin"),
        }
    }
    info!("No input given, using the default");
    default.to_string()
}

fn spawn_interrupt_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current stage");
            eprintln!("Interrupted: finishing the current stage, then stopping...");
            cancel.cancel();
        }
    });
}

fn report_error(error: &PipelineError) -> i32 {
    error!(error = %error, "Command failed");
    eprintln!("Error: {}", error.user_message());
    error.exit_code()
}

/// Show the error and whatever the run produced before it
fn report_failure(failure: &RunFailure) -> i32 {
    let code = report_error(&failure.error);
    if failure.transcript.is_empty() {
        eprintln!("No stages completed.");
    } else {
        eprintln!(
            "Partial transcript ({} stage(s) completed):",
            failure.transcript.len()
        );
        println!("{}", failure.transcript.to_markdown());
    }
    code
}

fn handle_config_command(config: &AppConfig, source: Option<&Path>, show: bool) -> i32 {
    if let Err(e) = config.validate() {
        return report_error(&PipelineError::Config(e));
    }
    match source {
        Some(path) => eprintln!("Configuration OK ({})", path.display()),
        None => eprintln!("Configuration OK (built-in defaults)"),
    }
    if show {
        match config.to_toml_string() {
            Ok(toml) => println!("{toml}"),
            Err(e) => return report_error(&PipelineError::Config(e)),
        }
    }
    0
}

/// Everything a run needs, built once from configuration and the environment
struct Components {
    gateway: Arc<CompletionGateway>,
    search: Option<Arc<dyn SearchProvider>>,
    registry: RoleRegistry,
}

impl Components {
    fn build(config: &AppConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let fast = LlmProviderFactory::create_provider(&config.models.fast)?;
        let deep = LlmProviderFactory::create_provider(&config.models.deep)?;
        let gateway = CompletionGateway::new(fast, deep, GatewaySettings::from(&config.pipeline));

        Ok(Self {
            gateway: Arc::new(gateway),
            search: SearchFactory::create_provider(config),
            registry: RoleRegistry::new(config),
        })
    }
}

/// Provider factory for creating LLM providers from configuration
struct LlmProviderFactory;

impl LlmProviderFactory {
    fn create_provider(model: &ModelConfig) -> Result<Arc<dyn LlmProvider>, PipelineError> {
        use boardroom::llm::providers::{
            AnthropicConfig, AnthropicProvider, GeminiConfig, GeminiProvider, OpenAiConfig,
            OpenAiProvider,
        };

        let api_key = model.api_key()?;
        let invalid = |e: boardroom::llm::LlmError| {
            PipelineError::Config(ConfigError::InvalidConfig(sanitize_error_message(
                &e.to_string(),
            )))
        };

        let provider: Arc<dyn LlmProvider> = match model.provider.as_str() {
            "openai" => {
                let mut openai_config = OpenAiConfig {
                    api_key,
                    ..Default::default()
                };
                if let Some(base_url) = &model.base_url {
                    openai_config.base_url = base_url.clone();
                }
                Arc::new(OpenAiProvider::new(openai_config).map_err(invalid)?)
            }
            "anthropic" => {
                let mut anthropic_config = AnthropicConfig {
                    api_key,
                    ..Default::default()
                };
                if let Some(base_url) = &model.base_url {
                    anthropic_config.base_url = base_url.clone();
                }
                Arc::new(AnthropicProvider::new(anthropic_config).map_err(invalid)?)
            }
            "gemini" => {
                let mut gemini_config = GeminiConfig {
                    api_key,
                    ..Default::default()
                };
                if let Some(base_url) = &model.base_url {
                    gemini_config.base_url = base_url.clone();
                }
                Arc::new(GeminiProvider::new(gemini_config).map_err(invalid)?)
            }
            other => {
                return Err(PipelineError::Config(ConfigError::InvalidConfig(format!(
                    "Unsupported LLM provider: {other}"
                ))))
            }
        };
        Ok(provider)
    }
}

struct SearchFactory;

impl SearchFactory {
    /// Search is optional: a missing key disables it with a warning
    fn create_provider(config: &AppConfig) -> Option<Arc<dyn SearchProvider>> {
        let search = &config.search;
        if !search.enabled {
            return None;
        }
        let Some(api_key) = search.api_key() else {
            warn!(
                env = %search.api_key_env,
                "Search API key not set, research runs without web search"
            );
            return None;
        };

        match SerperSearch::new(api_key, search.max_results) {
            Ok(serper) => {
                let serper = match &search.base_url {
                    Some(base_url) => serper.with_base_url(base_url.clone()),
                    None => serper,
                };
                Some(Arc::new(serper))
            }
            Err(e) => {
                warn!(error = %e, "Search disabled");
                None
            }
        }
    }
}
