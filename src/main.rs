use clap::{CommandFactory, Parser, Subcommand};
use git_lines::patch::{DEFAULT_CONTEXT_LINES, count_hunks};
use git_lines::{
    AutosquashReport, Config, GitLines, RebaseOutcome, RebaseSpec, RebaseState, RebaseStatus,
    StageOutcome, apply_spec_file, format_diff,
};
use serde::Serialize;
use std::error::Error;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "git-lines", version)]
#[command(about = "Non-interactive line-level staging and declarative rebase for git")]
struct Cli {
    /// Run as if git was started in PATH
    #[arg(
        short = 'C',
        long = "repo",
        value_name = "PATH",
        global = true,
        env = "GIT_LINES_REPO",
        default_value = "."
    )]
    repo: PathBuf,

    /// Context lines kept around each staged change
    #[arg(
        short = 'U',
        long = "context",
        value_name = "N",
        global = true,
        env = "GIT_LINES_CONTEXT",
        default_value_t = DEFAULT_CONTEXT_LINES
    )]
    context: usize,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show changes with the line numbers selections refer to
    Diff {
        /// Show staged instead of unstaged changes
        #[arg(long)]
        staged: bool,
        /// Limit to these paths
        paths: Vec<String>,
    },
    /// Stage specific lines (e.g. "src/lib.rs:12-15,20")
    Stage {
        /// Print the patch instead of applying it
        #[arg(long)]
        dry_run: bool,
        /// PATH:RANGES selections; ranges are N or N-M, comma separated
        #[arg(required = true, value_name = "SELECTION")]
        selections: Vec<String>,
    },
    /// Commit the staged changes
    Commit {
        #[arg(short, long)]
        message: String,
    },
    /// Unstage paths, or everything when none are given
    Reset { paths: Vec<String> },
    /// Rebase without an editor
    Rebase {
        #[command(subcommand)]
        command: RebaseCommand,
    },
    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Man,
}

#[derive(Subcommand)]
enum RebaseCommand {
    /// List the commits a rebase onto REF would replay
    List {
        #[arg(long, value_name = "REF")]
        onto: String,
    },
    /// Rebase onto REF following a list of actions
    Run {
        #[arg(long, value_name = "REF")]
        onto: String,
        /// JSON spec file, or - for stdin
        #[arg(
            long,
            value_name = "FILE",
            conflicts_with = "actions",
            required_unless_present = "actions"
        )]
        spec: Option<String>,
        /// COMMIT, ACTION:COMMIT, ACTION:COMMIT:MESSAGE or exec:COMMAND
        actions: Vec<String>,
    },
    /// Fold fixup!/squash! commits into their targets
    Autosquash {
        #[arg(long, value_name = "REF")]
        onto: String,
        /// Show the plan without rebasing
        #[arg(long)]
        dry_run: bool,
    },
    /// Continue a stopped rebase
    Continue,
    /// Abort the rebase in progress
    Abort,
    /// Skip the current commit and continue
    Skip,
    /// Show progress and conflicts of the rebase in progress
    Status,
    /// Rewrite a todo file from a JSON spec (run by git as the sequence editor)
    #[command(hide = true)]
    ApplySpec { spec: PathBuf, todo: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                println!("{}", serde_json::json!({ "error": e.to_string() }));
            } else {
                eprintln!("error: {e}");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "git_lines=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let lines = GitLines::new(Config::new(&cli.repo).with_context_lines(cli.context));

    match &cli.command {
        Commands::Diff { staged, paths } => {
            let diff = if *staged {
                lines.staged_diff(paths)?
            } else {
                lines.diff(paths)?
            };
            if cli.json {
                print_json(&diff)?;
            } else {
                print!("{}", format_diff(&diff));
            }
        }
        Commands::Stage {
            dry_run,
            selections,
        } => {
            let outcome = lines.stage(selections, *dry_run)?;
            if cli.json {
                print_json(&outcome)?;
            } else {
                match outcome {
                    StageOutcome::Staged { patch } => {
                        println!("Staged {} hunk(s).", count_hunks(&patch));
                    }
                    StageOutcome::DryRun { patch } => print!("{patch}"),
                    StageOutcome::NothingToStage => println!("No selected lines match a change."),
                }
            }
        }
        Commands::Commit { message } => {
            let commit = lines.commit(message)?;
            if cli.json {
                print_json(&commit)?;
            } else {
                println!("[{}] {}", commit.short_hash, commit.subject);
            }
        }
        Commands::Reset { paths } => {
            lines.reset(paths)?;
            if cli.json {
                println!("{}", serde_json::json!({ "status": "reset", "paths": paths }));
            } else if paths.is_empty() {
                println!("Unstaged all changes.");
            } else {
                println!("Unstaged {} path(s).", paths.len());
            }
        }
        Commands::Rebase { command } => run_rebase(cli, &lines, command)?,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(*shell, &mut cmd, name, &mut io::stdout());
        }
        Commands::Man => {
            clap_mangen::Man::new(Cli::command()).render(&mut io::stdout())?;
        }
    }

    Ok(())
}

fn run_rebase(cli: &Cli, lines: &GitLines, command: &RebaseCommand) -> Result<(), Box<dyn Error>> {
    match command {
        RebaseCommand::List { onto } => {
            let commits = lines.list_commits(onto)?;
            if cli.json {
                print_json(&commits)?;
            } else {
                for commit in &commits {
                    println!("{} {}", commit.short_hash, commit.subject);
                }
            }
        }
        RebaseCommand::Run {
            onto,
            spec,
            actions,
        } => {
            let spec = match spec.as_deref() {
                Some("-") => {
                    let mut text = String::new();
                    io::stdin().read_to_string(&mut text)?;
                    RebaseSpec::parse_json(&text)?
                }
                Some(path) => RebaseSpec::parse_json(&std::fs::read_to_string(path)?)?,
                None => RebaseSpec::parse_cli(actions)?,
            };
            let outcome = lines.rebase(onto, &spec, &std::env::current_exe()?)?;
            print_outcome(cli, &outcome)?;
        }
        RebaseCommand::Autosquash { onto, dry_run } => {
            let report = lines.autosquash(onto, *dry_run, &std::env::current_exe()?)?;
            print_autosquash(cli, &report)?;
        }
        RebaseCommand::Continue => print_outcome(cli, &lines.rebase_continue()?)?,
        RebaseCommand::Skip => print_outcome(cli, &lines.rebase_skip()?)?,
        RebaseCommand::Abort => {
            lines.rebase_abort()?;
            if cli.json {
                println!("{}", serde_json::json!({ "status": "aborted" }));
            } else {
                println!("Rebase aborted.");
            }
        }
        RebaseCommand::Status => print_status(cli, &lines.rebase_status()?)?,
        RebaseCommand::ApplySpec { spec, todo } => apply_spec_file(spec, todo)?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_outcome(cli: &Cli, outcome: &RebaseOutcome) -> Result<(), Box<dyn Error>> {
    if cli.json {
        return print_json(outcome);
    }

    match outcome {
        RebaseOutcome::Completed => println!("Rebase completed."),
        RebaseOutcome::Stopped { conflicts } if conflicts.is_empty() => {
            println!("Rebase stopped. Run `git-lines rebase continue` when ready.");
        }
        RebaseOutcome::Stopped { conflicts } => {
            println!("Rebase stopped with conflicts:");
            for path in conflicts {
                println!("  {path}");
            }
            println!("Resolve and stage them, then run `git-lines rebase continue` (or `abort`).");
        }
    }
    Ok(())
}

fn print_status(cli: &Cli, status: &RebaseStatus) -> Result<(), Box<dyn Error>> {
    if cli.json {
        return print_json(status);
    }
    if !status.in_progress {
        println!("No rebase in progress.");
        return Ok(());
    }

    match &status.branch {
        Some(branch) => println!("Rebase of {branch} in progress"),
        None => println!("Rebase in progress"),
    }
    if let Some(onto) = &status.onto {
        println!("  onto {onto}");
    }
    println!("  {}/{} steps done", status.done, status.total);

    if status.state == RebaseState::Conflict {
        println!("Conflicts:");
        for path in &status.conflicts {
            println!("  {path}");
        }
        println!("Resolve and stage them, then run `git-lines rebase continue` (or `abort`).");
    }
    Ok(())
}

fn print_autosquash(cli: &Cli, report: &AutosquashReport) -> Result<(), Box<dyn Error>> {
    if cli.json {
        return print_json(report);
    }

    if report.plan.is_noop() {
        println!("No fixup/squash commits to apply.");
        return Ok(());
    }

    match &report.outcome {
        None => {
            println!("Would apply {} fixup(s):", report.plan.fixup_count);
            for step in &report.plan.steps {
                let short = step.commit.get(..7).unwrap_or(step.commit.as_str());
                println!("  {} {} {}", step.action, short, step.subject);
            }
            Ok(())
        }
        Some(outcome) => {
            println!("Applied {} fixup(s).", report.plan.fixup_count);
            print_outcome(cli, outcome)
        }
    }
}
