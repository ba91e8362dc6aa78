//! Line-oriented terminal front end. Each input line is parsed as a
//! multicall command and dispatched to the intent commands.

use std::io::Write;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::warn;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};

use crate::{
    bridge::LocalWindowHost,
    models::{Category, Priority, Task, TaskDraft, TaskEdit},
    predictor::Suggestion,
    tasks::commands as task_commands,
    timer::{commands as timer_commands, TimerEvent, TimerStatus},
    utils::format::{format_clock, format_stop_summary},
    AppState,
};

#[derive(Parser, Debug)]
#[command(multicall = true)]
struct Line {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a task
    Add {
        title: String,
        description: String,
        /// high, medium or low
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
        /// Category slug; the suggested one is used when left out
        #[arg(short, long)]
        category: Option<Category>,
    },
    /// Edit a task's fields
    Edit {
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(short, long)]
        category: Option<Category>,
        /// Overwrite the recorded time, in seconds
        #[arg(long)]
        time: Option<u64>,
    },
    /// Delete a task, stopping its timer first
    Delete { id: String },
    /// List tasks grouped by category
    List,
    /// Show one task with its time history
    Show { id: String },
    /// Start the timer for a task
    Start { id: String },
    /// Stop the running timer
    Stop,
    /// Show the timer state
    Status,
    /// Act on the overlay window
    Overlay {
        #[command(subcommand)]
        action: OverlayAction,
    },
    /// Leave the program
    #[command(alias = "exit")]
    Quit,
}

#[derive(Subcommand, Debug)]
enum OverlayAction {
    /// Press the overlay's STOP button
    Stop,
    /// Close the overlay window
    Close,
}

enum Flow {
    Continue,
    Quit,
}

pub async fn run(state: AppState, overlay: LocalWindowHost) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut events = state.timer.subscribe();

    println!("SmartSynch. Type `help` for commands.");
    prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match handle_line(&state, &overlay, &line).await {
                    Flow::Quit => break,
                    Flow::Continue => prompt(),
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(message) = describe_event(&event) {
                        println!("\n{message}");
                        prompt();
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Err(err) = timer_commands::stop_timer(&state).await {
        warn!("Failed to record the running timer on exit: {err}");
    }
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn describe_event(event: &TimerEvent) -> Option<String> {
    match event {
        TimerEvent::Stopped { record, .. } => {
            Some(format!("Timer stopped. {}", format_stop_summary(record)))
        }
        TimerEvent::Resynced { seconds, .. } => {
            Some(format!("Timer adjusted to {}", format_clock(*seconds)))
        }
        TimerEvent::Started { .. } | TimerEvent::Tick { .. } => None,
    }
}

async fn handle_line(state: &AppState, overlay: &LocalWindowHost, line: &str) -> Flow {
    let args = match split_args(line) {
        Ok(args) if args.is_empty() => return Flow::Continue,
        Ok(args) => args,
        Err(err) => {
            println!("{err}");
            return Flow::Continue;
        }
    };

    let command = match Line::try_parse_from(args) {
        Ok(line) => line.command,
        Err(err) => {
            let _ = err.print();
            return Flow::Continue;
        }
    };

    if let Command::Quit = command {
        return Flow::Quit;
    }

    if let Err(err) = dispatch(state, overlay, command).await {
        println!("Error: {err}");
    }
    Flow::Continue
}

async fn dispatch(
    state: &AppState,
    overlay: &LocalWindowHost,
    command: Command,
) -> Result<(), String> {
    match command {
        Command::Add {
            title,
            description,
            priority,
            category,
        } => {
            let suggestion = task_commands::suggest_category(state, &title, &description).await;
            print_suggestion(suggestion.as_ref());

            let draft = TaskDraft {
                title,
                description,
                priority,
                category: category
                    .or(suggestion.map(|s| s.category))
                    .unwrap_or_default(),
            };
            let task = task_commands::create_task(state, draft, suggestion).await?;
            println!("Created {}", summary_line(&task));
        }
        Command::Edit {
            id,
            title,
            description,
            priority,
            category,
            time,
        } => {
            let task = resolve_task(state, &id).await?;
            let mut edit = TaskEdit::from(&task);
            if let Some(title) = title {
                edit.title = title;
            }
            if let Some(description) = description {
                edit.description = description;
            }
            if let Some(priority) = priority {
                edit.priority = priority;
            }
            if let Some(category) = category {
                edit.category = category;
            }
            edit.time_spent = time;

            let suggestion = if edit.title != task.title || edit.description != task.description {
                let suggestion =
                    task_commands::suggest_category(state, &edit.title, &edit.description).await;
                print_suggestion(suggestion.as_ref());
                suggestion
            } else {
                None
            };

            let task = task_commands::update_task(state, edit, suggestion).await?;
            println!("Updated {}", summary_line(&task));
        }
        Command::Delete { id } => {
            let task = resolve_task(state, &id).await?;
            let removed = task_commands::delete_task(state, &task.id).await?;
            println!("Deleted \"{}\"", removed.title);
        }
        Command::List => {
            let groups = task_commands::list_tasks_grouped(state).await?;
            if groups.is_empty() {
                println!("No tasks yet.");
            }
            for (category, tasks) in groups {
                println!("{}", category.display_name());
                for task in tasks {
                    println!("  {}", summary_line(&task));
                }
            }
        }
        Command::Show { id } => {
            let task = resolve_task(state, &id).await?;
            println!("{}", task.title);
            println!("  id:          {}", task.id);
            println!("  description: {}", task.description);
            println!("  priority:    {}", task.priority);
            println!("  category:    {}", task.category.display_name());
            println!("  time spent:  {}", format_clock(task.elapsed_seconds()));
            for record in &task.time_records {
                println!("  - {}", format_stop_summary(record));
            }
        }
        Command::Start { id } => {
            let task = resolve_task(state, &id).await?;
            let snapshot = timer_commands::start_timer(state, &task.id).await?;
            println!("Timer running for \"{}\" from {}", task.title, snapshot.display);
        }
        Command::Stop => match timer_commands::stop_timer(state).await? {
            Some(_) => {}
            None => println!("No timer is running."),
        },
        Command::Status => {
            let snapshot = timer_commands::get_timer_state(state).await?;
            match snapshot.state.status {
                TimerStatus::Running => println!(
                    "Running: {} {}",
                    snapshot.state.task_name.as_deref().unwrap_or_default(),
                    snapshot.display
                ),
                TimerStatus::Idle => println!("Idle"),
            }
        }
        Command::Overlay { action } => {
            let acted = match action {
                OverlayAction::Stop => overlay.press_stop(),
                OverlayAction::Close => overlay.close_window(),
            };
            if !acted {
                println!("No overlay window is open.");
            }
        }
        Command::Quit => {}
    }
    Ok(())
}

fn print_suggestion(suggestion: Option<&Suggestion>) {
    if let Some(suggestion) = suggestion {
        println!(
            "Suggested category: {} ({}% match)",
            suggestion.category.display_name(),
            suggestion.percent()
        );
    }
}

fn summary_line(task: &Task) -> String {
    let mut line = format!(
        "[{}] {} ({}, {})",
        short_id(&task.id),
        task.title,
        task.priority,
        format_clock(task.elapsed_seconds())
    );
    if let Some(record) = task.last_record() {
        line.push_str(" - ");
        line.push_str(&format_stop_summary(record));
    }
    line
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Accepts a full id or any unambiguous prefix of one.
async fn resolve_task(state: &AppState, id: &str) -> Result<Task, String> {
    let tasks = task_commands::list_tasks(state).await?;
    if let Some(task) = tasks.iter().find(|task| task.id == id) {
        return Ok(task.clone());
    }

    let mut matches = tasks.into_iter().filter(|task| task.id.starts_with(id));
    match (matches.next(), matches.next()) {
        (Some(task), None) => Ok(task),
        (Some(_), Some(_)) => Err(format!("task id prefix '{id}' is ambiguous")),
        (None, _) => Err(format!("task not found: {id}")),
    }
}

/// Whitespace split that keeps single- or double-quoted runs together.
fn split_args(line: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_arg = true;
            }
            None if ch.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            None => {
                current.push(ch);
                in_arg = true;
            }
        }
    }

    if quote.is_some() {
        return Err("unterminated quote".to_string());
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}
