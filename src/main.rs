use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::json;

use issuectl::commands::{body_edit, create, get, init, list, transitions, CommandContext, TextSource};
use issuectl::config;
use issuectl::error::Error;
use issuectl::log::parse_log_level;
use issuectl::types::{parse_issue_kind, parse_workflow_state, IssueKind, WorkflowState};
use issuectl::log_error;

#[derive(Parser)]
#[command(name = "issuectl", about = "Prescriptive CLI for an Epic/Task/Sub-task issue hierarchy")]
struct Cli {
    /// Path to the project manifest (defaults to ./issuectl.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity level (error, warn, info, debug)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit a structured JSON envelope instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// `--body <b>|--body-file <p>|-` (spec.md §6): "-" passed as the inline
/// value means stdin, so only two flags are needed.
#[derive(Args, Clone)]
struct BodyOpt {
    #[arg(long)]
    body: Option<String>,
    #[arg(long)]
    body_file: Option<PathBuf>,
}

impl BodyOpt {
    fn resolve(self) -> Result<Option<String>, Error> {
        resolve_text_opt(self.body, self.body_file)
    }
}

#[derive(Args, Clone)]
struct MessageOpt {
    #[arg(long)]
    message: Option<String>,
    #[arg(long)]
    message_file: Option<PathBuf>,
}

impl MessageOpt {
    fn resolve(self) -> Result<Option<String>, Error> {
        resolve_text_opt(self.message, self.message_file)
    }
}

fn resolve_text_opt(inline: Option<String>, file: Option<PathBuf>) -> Result<Option<String>, Error> {
    match (inline, file) {
        (Some(value), None) if value == "-" => Some(TextSource::Stdin.resolve()).transpose(),
        (Some(value), None) => Ok(Some(value)),
        (None, Some(path)) => Some(TextSource::File(path).resolve()).transpose(),
        (None, None) => Ok(None),
        (Some(_), Some(_)) => Err(Error::InternalError(
            "--body/--message and --body-file/--message-file are mutually exclusive".to_string(),
        )),
    }
}

#[derive(Args, Clone)]
struct CreateOpt {
    #[arg(long)]
    repo: Option<String>,
    #[arg(long)]
    title: String,
    #[command(flatten)]
    body: BodyOpt,
    #[arg(long, value_delimiter = ',')]
    labels: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    assignees: Vec<String>,
    #[arg(long)]
    milestone: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure issue types and status/type labels exist
    Init {
        #[arg(long)]
        repo: Option<String>,
    },
    /// Fetch an issue by number, optionally enforcing its kind
    Get {
        kind: Option<String>,
        #[arg(long)]
        id: u64,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long, default_value = "rich")]
        format: String,
    },
    CreateEpic {
        #[command(flatten)]
        opt: CreateOpt,
    },
    CreateTask {
        #[arg(long)]
        parent_epic: u64,
        #[command(flatten)]
        opt: CreateOpt,
    },
    CreateSubTask {
        #[arg(long)]
        parent_task: u64,
        #[command(flatten)]
        opt: CreateOpt,
    },
    SetBody {
        issue: u64,
        #[arg(long)]
        repo: Option<String>,
        #[command(flatten)]
        body: BodyOpt,
    },
    CreateTodo {
        issue: u64,
        section: String,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        text_file: Option<PathBuf>,
        #[arg(long)]
        create_section: bool,
    },
    CheckTodo {
        issue: u64,
        section: String,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long, name = "match")]
        match_text: String,
    },
    StartPlan {
        issue: u64,
        #[arg(long)]
        repo: Option<String>,
        #[command(flatten)]
        message: MessageOpt,
    },
    SubmitPlan {
        issue: u64,
        #[arg(long)]
        repo: Option<String>,
        #[command(flatten)]
        message: MessageOpt,
    },
    ApprovePlan {
        issue: u64,
        #[arg(long)]
        repo: Option<String>,
        #[command(flatten)]
        message: MessageOpt,
    },
    StartWork {
        issue: u64,
        #[arg(long)]
        repo: Option<String>,
        #[command(flatten)]
        message: MessageOpt,
    },
    SubmitWork {
        issue: u64,
        #[arg(long)]
        repo: Option<String>,
        #[command(flatten)]
        message: MessageOpt,
    },
    ApproveWork {
        issue: u64,
        #[arg(long)]
        repo: Option<String>,
        #[command(flatten)]
        message: MessageOpt,
    },
    /// List issues of a kind, optionally filtered by workflow state
    List {
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        state: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match parse_log_level(&cli.log_level) {
        Ok(level) => issuectl::log::set_log_level(level),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    let json_output = cli.json;
    let result = run(cli).await;

    match result {
        Ok(value) => {
            if json_output {
                println!("{}", serde_json::to_string_pretty(&value).unwrap());
            } else if let Some(text) = value.get("_rich").and_then(|v| v.as_str()) {
                println!("{}", text);
            } else {
                println!("{}", value);
            }
        }
        Err(e) => {
            if json_output {
                let envelope = json!({
                    "error": {
                        "title": e.title(),
                        "reason": e.to_string(),
                        "remediation": e.remediation_hint(),
                        "valid_options": e.valid_options(),
                    }
                });
                println!("{}", serde_json::to_string_pretty(&envelope).unwrap());
            } else {
                log_error!("Error: {}", e.title());
                log_error!("  {}", e);
                if let Some(hint) = e.remediation_hint() {
                    log_error!("  Hint: {}", hint);
                }
            }
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<serde_json::Value, Error> {
    let config = config::load_config_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { repo } => {
            let ctx = CommandContext::build(config, repo.as_deref())?;
            let report = init::init(&ctx).await;
            Ok(render_init(&report))
        }
        Commands::Get { kind, id, repo, format } => {
            let ctx = CommandContext::build(config, repo.as_deref())?;
            let kind = kind.map(|k| parse_issue_kind(&k)).transpose().map_err(Error::InvalidArgument)?;
            let result = get::get(&ctx, kind, id).await?;
            Ok(render_get(&result, &format))
        }
        Commands::CreateEpic { opt } => {
            let ctx = CommandContext::build(config, opt.repo.as_deref())?;
            let args = resolve_create_args(opt)?;
            let result = create::create_epic(&ctx, args).await?;
            Ok(render_create(&result))
        }
        Commands::CreateTask { parent_epic, opt } => {
            let ctx = CommandContext::build(config, opt.repo.as_deref())?;
            let args = resolve_create_args(opt)?;
            let result = create::create_task(&ctx, parent_epic, args).await?;
            Ok(render_create(&result))
        }
        Commands::CreateSubTask { parent_task, opt } => {
            let ctx = CommandContext::build(config, opt.repo.as_deref())?;
            let args = resolve_create_args(opt)?;
            let result = create::create_sub_task(&ctx, parent_task, args).await?;
            Ok(render_create(&result))
        }
        Commands::SetBody { issue, repo, body } => {
            let ctx = CommandContext::build(config, repo.as_deref())?;
            let new_body = body.resolve()?.unwrap_or_default();
            let updated = body_edit::set_body(&ctx, issue, new_body).await?;
            Ok(render_issue(&updated))
        }
        Commands::CreateTodo {
            issue,
            section,
            repo,
            text,
            text_file,
            create_section,
        } => {
            let ctx = CommandContext::build(config, repo.as_deref())?;
            let text = resolve_text_opt(text, text_file)?
                .ok_or_else(|| Error::InternalError("--text or --text-file is required".to_string()))?;
            let updated = body_edit::create_todo(&ctx, issue, &section, &text, create_section).await?;
            Ok(render_issue(&updated))
        }
        Commands::CheckTodo {
            issue,
            section,
            repo,
            match_text,
        } => {
            let ctx = CommandContext::build(config, repo.as_deref())?;
            let updated = body_edit::check_todo(&ctx, issue, &section, &match_text).await?;
            Ok(render_issue(&updated))
        }
        Commands::StartPlan { issue, repo, message } => run_transition(config, "start-plan", issue, repo, message).await,
        Commands::SubmitPlan { issue, repo, message } => {
            run_transition(config, "submit-plan", issue, repo, message).await
        }
        Commands::ApprovePlan { issue, repo, message } => {
            run_transition(config, "approve-plan", issue, repo, message).await
        }
        Commands::StartWork { issue, repo, message } => run_transition(config, "start-work", issue, repo, message).await,
        Commands::SubmitWork { issue, repo, message } => {
            run_transition(config, "submit-work", issue, repo, message).await
        }
        Commands::ApproveWork { issue, repo, message } => {
            run_transition(config, "approve-work", issue, repo, message).await
        }
        Commands::List { repo, kind, state } => {
            let ctx = CommandContext::build(config, repo.as_deref())?;
            let kind = kind.map(|k| parse_issue_kind(&k)).transpose().map_err(Error::InvalidArgument)?;
            let state = state
                .map(|s| parse_workflow_state(&s))
                .transpose()
                .map_err(Error::InvalidArgument)?;
            let results = list::list(&ctx, kind, state).await?;
            Ok(render_list(&results))
        }
    }
}

async fn run_transition(
    config: config::Config,
    transition_name: &str,
    issue: u64,
    repo: Option<String>,
    message: MessageOpt,
) -> Result<serde_json::Value, Error> {
    let ctx = CommandContext::build(config, repo.as_deref())?;
    let message = message.resolve()?;
    let result = transitions::apply_transition(&ctx, transition_name, issue, message).await?;
    Ok(json!({
        "issue": issue_json(&result.issue),
        "from_state": result.from_state.label_value(),
        "to_state": result.to_state.label_value(),
    }))
}

fn resolve_create_args(opt: CreateOpt) -> Result<create::CreateArgs, Error> {
    Ok(create::CreateArgs {
        title: opt.title,
        body: opt.body.resolve()?,
        labels: opt.labels,
        assignees: opt.assignees,
        milestone: opt.milestone,
    })
}

fn issue_json(issue: &issuectl::types::Issue) -> serde_json::Value {
    json!({
        "number": issue.number,
        "title": issue.title,
        "kind": issue.kind.label_value(),
        "labels": issue.labels,
        "assignees": issue.assignees,
        "milestone": issue.milestone,
        "open": issue.open,
    })
}

fn render_issue(issue: &issuectl::types::Issue) -> serde_json::Value {
    issue_json(issue)
}

fn render_create(result: &create::CreateResult) -> serde_json::Value {
    json!({
        "issue": issue_json(&result.issue),
        "fallback": result.fallback.as_str(),
    })
}

fn render_get(result: &get::GetResult, format: &str) -> serde_json::Value {
    let value = json!({
        "issue": issue_json(&result.issue),
        "state": result.state.label_value(),
        "parent": result.parent_number,
        "children": result.child_numbers,
    });
    if format == "json" {
        value
    } else {
        let mut rich = format!(
            "#{} {} [{}] ({})\n",
            result.issue.number,
            result.issue.title,
            result.issue.kind.label_value(),
            result.state.label_value()
        );
        if let Some(parent) = result.parent_number {
            rich.push_str(&format!("Parent: #{}\n", parent));
        }
        if !result.child_numbers.is_empty() {
            rich.push_str(&format!(
                "Children: {}\n",
                result
                    .child_numbers
                    .iter()
                    .map(|n| format!("#{}", n))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        json!({ "_rich": rich })
    }
}

fn render_init(report: &init::InitReport) -> serde_json::Value {
    json!({
        "items": report
            .items
            .iter()
            .map(|item| json!({
                "name": item.name,
                "outcome": match item.outcome {
                    init::Outcome::Created => "created",
                    init::Outcome::Existing => "existing",
                    init::Outcome::Fallback => "fallback",
                },
            }))
            .collect::<Vec<_>>(),
        "errors": report.errors,
    })
}

fn render_list(results: &[list::ListedIssue]) -> serde_json::Value {
    json!({
        "issues": results
            .iter()
            .map(|r| {
                let mut v = issue_json(&r.issue);
                v["state"] = json!(r.state.label_value());
                v
            })
            .collect::<Vec<_>>(),
    })
}
