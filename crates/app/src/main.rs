mod commands;
mod utils;

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use commands::Command;
use engine::{AnalyzerWorkflow, ChatSession, ChatUpdate, LoginFlow, WorkflowState};
use gateway::{Gateway, HttpGateway};
use shared::analysis::{AttributeField, PredictionResult};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let skip_login = std::env::args().skip(1).any(|arg| arg == "--skip-login");

    let (settings, loaded) = utils::load_settings_or_default();
    if !loaded {
        match utils::write_default_if_missing() {
            Ok(Some(path)) => tracing::info!(path = %path.display(), "wrote default settings"),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "could not write default settings"),
        }
    }

    let http = HttpGateway::new(&settings).context("invalid backend_url in settings")?;
    tracing::info!(backend = %http.origin(), "DopamineExp client starting");
    let gateway: Arc<dyn Gateway> = Arc::new(http);

    let mut input: Input = BufReader::new(tokio::io::stdin()).lines();

    if !skip_login && !login(gateway.clone(), &mut input).await? {
        return Ok(());
    }

    let mut workflow = AnalyzerWorkflow::new(gateway.clone());
    let mut chat = ChatSession::from_settings(gateway, &settings);
    if let Some(greeting) = chat.transcript().last() {
        println!("assistant: {}", greeting.content());
    }
    println!("Type 'help' for commands.");

    loop {
        if !chat.is_in_flight() {
            prompt("> ");
        }
        let line = if chat.is_in_flight() {
            tokio::select! {
                update = chat.next_update() => {
                    if let Some(update) = update {
                        render_update(&update);
                    }
                    continue;
                }
                line = input.next_line() => line?,
            }
        } else {
            input.next_line().await?
        };
        let Some(line) = line else { break };

        let command = match commands::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match command {
            Command::Nothing => {}
            Command::Help => println!("{}", commands::HELP),
            Command::Quit => break,
            Command::Analyze(url) => match workflow.submit_url(&url) {
                Ok(()) => {
                    println!("Analyzing {}...", workflow.url());
                    workflow.settle().await;
                    report_workflow(&workflow);
                }
                Err(e) => println!("Cannot analyze: {e}"),
            },
            Command::Set { field, value } => match workflow.edit_field(&field, &value) {
                Ok(()) => {
                    if let (Some(attrs), Some(field)) =
                        (workflow.attributes(), AttributeField::from_key(&field))
                    {
                        println!("{} = {}", field.key(), attrs.get(field));
                    }
                }
                Err(e) => println!("{e}"),
            },
            Command::Fields => print_fields(&workflow),
            Command::Score => match workflow.submit_details() {
                Ok(()) => {
                    println!("Scoring...");
                    workflow.settle().await;
                    report_workflow(&workflow);
                }
                Err(e) => println!("Cannot score: {e}"),
            },
            Command::Reset => {
                workflow.reset();
                println!("Analyzer reset. Enter a URL with 'analyze <url>'.");
            }
            Command::Status => print_status(&workflow, &chat),
            Command::Chat(text) => match chat.send(&text) {
                Ok(()) => print!("assistant: "),
                Err(e) => println!("Cannot send: {e}"),
            },
            Command::Cancel => {
                if chat.cancel() {
                    println!("\n[reply cancelled]");
                } else {
                    println!("Nothing to cancel.");
                }
            }
            Command::Clear => {
                chat.clear();
                println!("Chat cleared.");
            }
        }
        flush();
    }

    chat.cancel();
    workflow.reset();
    Ok(())
}

/// Walk the email / code prompts until authenticated. Returns false on EOF.
async fn login(gateway: Arc<dyn Gateway>, input: &mut Input) -> anyhow::Result<bool> {
    let mut flow = LoginFlow::new(gateway);
    while !flow.is_authenticated() {
        let Some(email) = ask(input, "email: ").await? else {
            return Ok(false);
        };
        match flow.request_code(&email).await {
            Ok(message) => println!("{message}"),
            Err(e) => {
                println!("{}", e.user_message());
                continue;
            }
        }

        let Some(code) = ask(input, "code: ").await? else {
            return Ok(false);
        };
        match flow.verify(&code).await {
            Ok(message) => println!("{message}"),
            Err(e) => println!("{}", e.user_message()),
        }
    }
    Ok(true)
}

async fn ask(input: &mut Input, label: &str) -> anyhow::Result<Option<String>> {
    prompt(label);
    Ok(input.next_line().await?)
}

fn prompt(label: &str) {
    print!("{label}");
    flush();
}

fn flush() {
    let _ = std::io::stdout().flush();
}

fn render_update(update: &ChatUpdate) {
    match update {
        ChatUpdate::Delta(text) => print!("{text}"),
        ChatUpdate::Completed => println!(),
        ChatUpdate::Failed(reason) => {
            tracing::debug!(%reason, "reply replaced by apology");
            println!("\n[reply failed]");
        }
    }
    flush();
}

fn report_workflow(workflow: &AnalyzerWorkflow) {
    if let Some(message) = workflow.error_message() {
        println!("Error: {message}");
        return;
    }
    match workflow.state() {
        WorkflowState::AwaitingUrl => {}
        WorkflowState::AwaitingDetails { subject, .. } => {
            println!("Video:   {}", subject.title);
            println!("Channel: {}", subject.channel_name);
            println!("Fill in details with 'set <field> <value>' ('fields' lists them), then 'score'.");
        }
        WorkflowState::ShowingResult { prediction, .. } => print_prediction(prediction),
    }
}

fn print_prediction(prediction: &PredictionResult) {
    println!("Result: {}", prediction.final_label);
    println!("  low dopamine:  {:.1}%", prediction.probability_low * 100.0);
    println!("  high dopamine: {:.1}%", prediction.probability_high * 100.0);
}

fn print_fields(workflow: &AnalyzerWorkflow) {
    let attrs = workflow.attributes();
    for field in AttributeField::ALL {
        let current = attrs.map(|a| a.get(field)).unwrap_or_else(|| "-".into());
        println!("{:<20} {} [{}]", field.key(), field.label(), current);
        println!("{:<20} one of: {}", "", field.choices().join(", "));
    }
    if attrs.is_none() {
        println!("(analyze a URL first to edit these)");
    }
}

fn print_status(workflow: &AnalyzerWorkflow, chat: &ChatSession) {
    println!("analyzer step: {:?}", workflow.step());
    if !workflow.url().is_empty() {
        println!("url: {}", workflow.url());
    }
    if let Some(subject) = workflow.subject() {
        println!("video: {} ({})", subject.title, subject.channel_name);
    }
    if let Some(prediction) = workflow.prediction() {
        print_prediction(prediction);
    }
    if let Some(message) = workflow.error_message() {
        println!("last error: {message}");
    }
    println!(
        "chat: {} messages{}",
        chat.transcript().len(),
        if chat.is_in_flight() { ", reply streaming" } else { "" }
    );
}
