use anyhow::{bail, Result};
use runstream::config::Config;
use runstream::logging::init_tracing;
use runstream::state::{ConnectionStatus, MessageKind, RunPhase, RunState};
use runstream::{RunController, RunMode};

const USAGE: &str =
    "usage: runstream [--sync | --plan [--approve | --revise <feedback>]] <message>";

#[derive(Debug, PartialEq, Eq)]
struct CliArgs {
    mode: RunMode,
    approve: bool,
    feedback: Option<String>,
    message: String,
}

fn parse_args<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = RunMode::Stream;
    let mut approve = false;
    let mut feedback = None;
    let mut words = Vec::new();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--sync" => mode = RunMode::Sync,
            "--plan" => mode = RunMode::PlanOnly,
            "--approve" => approve = true,
            "--revise" => match args.next() {
                Some(text) => feedback = Some(text),
                None => bail!("--revise needs feedback text\n{USAGE}"),
            },
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with("--") => bail!("unknown flag '{flag}'\n{USAGE}"),
            _ => words.push(arg),
        }
    }

    if (approve || feedback.is_some()) && mode != RunMode::PlanOnly {
        bail!("--approve and --revise only apply with --plan\n{USAGE}");
    }
    let message = words.join(" ");
    if message.trim().is_empty() {
        bail!(USAGE);
    }

    Ok(CliArgs {
        mode,
        approve,
        feedback,
        message,
    })
}

/// Prints transcript messages as they appear.
#[derive(Default)]
struct TranscriptPrinter {
    printed: usize,
    connection: ConnectionStatus,
}

impl TranscriptPrinter {
    fn print_new(&mut self, state: &RunState) {
        if self.printed > state.messages.len() {
            self.printed = 0;
        }
        for message in &state.messages[self.printed..] {
            match message.kind {
                MessageKind::User => println!("> {}\n", message.content),
                MessageKind::Agent => println!("{}\n", message.content),
                MessageKind::System => eprintln!("[{}] {}", message.kind.label(), message.content),
            }
        }
        self.printed = state.messages.len();

        if state.connection != self.connection {
            if let ConnectionStatus::Reconnecting {
                attempt,
                retry_in_ms,
            } = state.connection
            {
                eprintln!("[stream] reconnecting (attempt {attempt}) in {retry_in_ms}ms");
            }
            self.connection = state.connection;
        }
    }
}

enum Step {
    Event(bool),
    Interrupt,
}

/// Follows the stream until the run settles. Ctrl-C asks the server to cancel.
async fn follow(controller: &mut RunController, printer: &mut TranscriptPrinter) {
    while controller.state().is_working && controller.connection().is_connected() {
        let step = tokio::select! {
            next = controller.process_next() => Step::Event(next.is_some()),
            _ = tokio::signal::ctrl_c() => Step::Interrupt,
        };
        match step {
            Step::Event(true) => {}
            Step::Event(false) => break,
            Step::Interrupt => controller.cancel_run().await,
        }
        printer.print_new(controller.state());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let config = Config::load()?;
    config.validate()?;
    let args = parse_args(std::env::args().skip(1))?;

    let mut controller = RunController::from_config(&config)?;
    let mut printer = TranscriptPrinter::default();

    controller.start_run(&args.message, args.mode).await;
    printer.print_new(controller.state());

    if args.mode == RunMode::PlanOnly {
        if let Some(plan) = controller.state().plan_markdown() {
            println!("{plan}\n");
        }
        if let Some(feedback) = args.feedback.as_deref() {
            controller.revise_plan(feedback).await;
        } else if args.approve {
            controller.approve_plan().await;
        }
        printer.print_new(controller.state());
    }

    follow(&mut controller, &mut printer).await;

    if controller.state().phase == RunPhase::Errored {
        bail!("run ended with an error");
    }
    Ok(())
}
