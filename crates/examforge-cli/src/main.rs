//! examforge CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use examforge_core::error::ExamError;
use examforge_core::model::{Board, ChoiceSelection, Difficulty};

mod commands;

#[derive(Parser)]
#[command(
    name = "examforge",
    version,
    about = "Generate, sit and evaluate board-pattern exams with an LLM"
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config file
    Init,

    /// Show the exam pattern table
    Patterns {
        /// Only this board (CBSE, ICSE, WBBSE)
        #[arg(long)]
        board: Option<Board>,
    },

    /// List models reported by the backend
    ListModels,

    /// Show model resolution and runtime state
    AiInfo {
        /// Send one short prompt through the fallback chain
        #[arg(long)]
        probe: bool,
    },

    /// Generate a new exam
    Create {
        /// Student name
        #[arg(long)]
        name: String,

        /// Student email
        #[arg(long)]
        email: String,

        /// Board: CBSE, ICSE or WBBSE
        #[arg(long)]
        board: Board,

        /// Class, 6 to 12
        #[arg(long)]
        class: u8,

        /// Subject
        #[arg(long)]
        subject: String,

        /// Chapter or topic to concentrate on
        #[arg(long)]
        chapter: Option<String>,

        /// easy, medium, hard, extreme, ultra_extreme
        #[arg(long, default_value = "medium")]
        difficulty: Difficulty,

        /// Custom duration in minutes (never longer than the pattern's)
        #[arg(long)]
        duration: Option<u32>,

        /// Text file with syllabus notes to include in the prompt
        #[arg(long)]
        syllabus: Option<PathBuf>,
    },

    /// Start an exam and its countdown
    Start { exam_id: Uuid },

    /// Show the question under the pointer
    Current { exam_id: Uuid },

    /// Save or edit the answer to a question
    Answer {
        exam_id: Uuid,

        /// Question number (1-based, as printed on the paper)
        #[arg(long)]
        question: u32,

        /// Typed answer
        #[arg(long)]
        text: Option<String>,

        /// Selected MCQ option (A-D)
        #[arg(long)]
        option: Option<String>,

        /// Alternative answered for an internal-choice question: main or alternative
        #[arg(long)]
        choice: Option<ChoiceSelection>,
    },

    /// Attach a document to an answer
    Upload {
        exam_id: Uuid,

        /// Question number (1-based)
        #[arg(long)]
        question: u32,

        /// File to upload
        #[arg(long)]
        file: PathBuf,
    },

    /// Move to the next question
    Next { exam_id: Uuid },

    /// Submit an exam
    Submit { exam_id: Uuid },

    /// Show the remaining time
    Timer {
        exam_id: Uuid,

        /// Record the remaining seconds reported by a client
        #[arg(long)]
        snapshot: Option<u32>,
    },

    /// Evaluate an exam, submitting it first if needed
    Evaluate { exam_id: Uuid },

    /// Print the stored evaluation report
    Report { exam_id: Uuid },

    /// Summarize an exam
    Summary { exam_id: Uuid },

    /// Print the full paper with answers (after submission)
    Paper { exam_id: Uuid },

    /// List stored exams
    List,

    /// Delete an exam and its uploaded files
    Delete { exam_id: Uuid },
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("examforge=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let json = cli.json;

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Patterns { board } => commands::patterns::execute(board, config, json),
        Commands::ListModels => commands::list_models::execute(config, json).await,
        Commands::AiInfo { probe } => commands::ai_info::execute(probe, config, json).await,
        Commands::Create {
            name,
            email,
            board,
            class,
            subject,
            chapter,
            difficulty,
            duration,
            syllabus,
        } => {
            commands::create::execute(
                commands::create::CreateArgs {
                    name,
                    email,
                    board,
                    class,
                    subject,
                    chapter,
                    difficulty,
                    duration,
                    syllabus,
                },
                config,
                json,
            )
            .await
        }
        Commands::Start { exam_id } => commands::session::start(exam_id, config, json).await,
        Commands::Current { exam_id } => commands::session::current(exam_id, config, json).await,
        Commands::Answer {
            exam_id,
            question,
            text,
            option,
            choice,
        } => {
            commands::session::answer(exam_id, question, text, option, choice, config, json).await
        }
        Commands::Upload {
            exam_id,
            question,
            file,
        } => commands::session::upload(exam_id, question, file, config, json).await,
        Commands::Next { exam_id } => commands::session::next(exam_id, config, json).await,
        Commands::Submit { exam_id } => commands::session::submit(exam_id, config, json).await,
        Commands::Timer { exam_id, snapshot } => {
            commands::session::timer(exam_id, snapshot, config, json).await
        }
        Commands::Evaluate { exam_id } => commands::evaluate::execute(exam_id, config, json).await,
        Commands::Report { exam_id } => commands::results::report(exam_id, config, json).await,
        Commands::Summary { exam_id } => commands::results::summary(exam_id, config, json).await,
        Commands::Paper { exam_id } => commands::results::paper(exam_id, config, json).await,
        Commands::List => commands::manage::list(config, json).await,
        Commands::Delete { exam_id } => commands::manage::delete(exam_id, config, json).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        // Requests the exam's state refuses exit 2; everything else exits 1.
        let rejected = e
            .downcast_ref::<ExamError>()
            .is_some_and(ExamError::is_rejected_precondition);
        process::exit(if rejected { 2 } else { 1 });
    }
}
