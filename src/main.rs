//! # grokctx CLI (`grok`)
//!
//! The `grok` binary manages a document store and answers questions with
//! context retrieved from it.
//!
//! ## Usage
//!
//! ```bash
//! grok [--config ./grokctx.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `grok init [dir]` | Create an empty store |
//! | `grok add <paths>` | Chunk, embed, and register documents |
//! | `grok forget <paths>` | Unregister documents |
//! | `grok refresh` | Re-chunk every document and collect garbage |
//! | `grok ls` | List registered documents |
//! | `grok gc` | Drop orphaned and stale chunks |
//! | `grok ctx "<query>"` | Print the context that would be sent for a query |
//! | `grok q "<question>"` | Answer a question from the store |
//! | `grok revise` / `grok continue` | Revise or continue stdin with context |
//! | `grok msg "<sysmsg>"` | Plain completion of stdin |
//! | `grok chat <file>` | Continue a chat file |
//! | `grok embed` / `grok similarity` | Vector utilities |
//! | `grok tc` | Count tokens of stdin |
//! | `grok backup` | Copy the store to the temp directory |
//!
//! The store is found by searching the current directory and its parents
//! for `store.name` (`.grok` by default). Read-only commands share the
//! store lock; everything else holds it exclusively.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use grokctx::commands::{self, RagOptions};
use grokctx::config::{self, Config};
use grokctx::history::{add_to_store, continue_chat, ChatHistory, ChatOptions, ContextLevel};
use grokctx::lock::LockMode;
use grokctx::logging;
use grokctx::provider::create_provider;
use grokctx::session::Session;
use grokctx::tokenizer::create_tokenizer;
use grokctx_core::embedding::Provider;
use grokctx_core::search::{self, ContextOptions};
use grokctx_core::tokenizer::Tokenizer;
use grokctx_core::STORE_VERSION;
use tracing::{info, warn};

/// grokctx: chat with an LLM about your documents.
#[derive(Parser)]
#[command(
    name = "grok",
    about = "Retrieval-augmented context for LLM questions and chats",
    version,
    long_about = "grokctx chunks and embeds local documents into a store file, retrieves the \
    chunks most similar to a question within the model's token budget, and keeps long chat \
    histories within budget by summarizing them."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./grokctx.toml` if it exists, otherwise built-in
    /// defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty store.
    ///
    /// Fails if a store already exists in the directory.
    Init {
        /// Directory to create the store in (default: current directory).
        dir: Option<PathBuf>,
    },

    /// Add documents to the store.
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Remove documents from the store.
    Forget {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Re-chunk and re-embed every document, forgetting missing ones.
    Refresh,

    /// List documents in the store.
    Ls,

    /// Remove orphaned and stale chunks.
    Gc,

    /// Print the context retrieved for a query.
    Ctx {
        query: String,

        /// Token budget (default: half the context window).
        #[arg(long)]
        limit: Option<usize>,

        /// Prefix each chunk with `from <path>:`.
        #[arg(long)]
        headers: bool,

        /// Prefix each line with its line number in the document.
        #[arg(long)]
        line_numbers: bool,

        /// Restrict retrieval to these documents.
        #[arg(long = "file")]
        files: Vec<String>,
    },

    /// Answer a question using the store as context.
    Q {
        question: String,

        /// Also ask the model without context first.
        #[arg(short, long)]
        global: bool,
    },

    /// Revise text read from stdin.
    Revise {
        #[arg(short, long)]
        global: bool,

        /// Treat the first paragraph of the input as the system message.
        #[arg(short = 's', long)]
        sysmsg_in: bool,
    },

    /// Continue text read from stdin.
    Continue {
        #[arg(short, long)]
        global: bool,
    },

    /// Send stdin to the model under a system message, without context.
    Msg { sysmsg: String },

    /// Continue a chat file with a prompt (from `-p` or stdin).
    Chat {
        file: PathBuf,

        #[arg(short, long)]
        prompt: Option<String>,

        /// System message for this chat file.
        #[arg(short, long)]
        sysmsg: Option<String>,

        #[arg(long, value_enum)]
        context_level: Option<ContextLevel>,

        /// Budget for context and history (default: half the context window).
        #[arg(long)]
        token_limit: Option<usize>,

        /// Append a file to the prompt as a `from <path>:` block.
        #[arg(short = 'i', long = "input-file")]
        input_files: Vec<PathBuf>,

        /// Do not add the chat file to the store after saving it.
        #[arg(short = 'D', long)]
        no_add_to_store: bool,
    },

    /// Print the embedding of a text (from the argument or stdin) as JSON.
    Embed { text: Option<String> },

    /// Print the similarity of each text to a reference text.
    Similarity {
        reference: String,
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Count tokens of stdin.
    Tc,

    /// Back up the store file.
    Backup,

    /// Print the program and store schema versions.
    Version,
}

impl Commands {
    fn lock_mode(&self) -> LockMode {
        match self {
            Commands::Ls
            | Commands::Ctx { .. }
            | Commands::Embed { .. }
            | Commands::Similarity { .. }
            | Commands::Backup => LockMode::Shared,
            _ => LockMode::Exclusive,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_or_default(cli.config.as_deref())?;
    logging::init(&cfg.logging.level)?;
    let tokenizer = create_tokenizer(&cfg.tokenizer)?;

    // Commands that don't need a store
    match &cli.command {
        Commands::Version => {
            println!("grok {}", env!("CARGO_PKG_VERSION"));
            println!("store schema {}", STORE_VERSION);
            return Ok(());
        }
        Commands::Init { dir } => {
            let dir = dir.clone().unwrap_or_else(|| PathBuf::from("."));
            let path = Session::init(&dir, &cfg, tokenizer)?;
            println!("Initialized store at {}", path.display());
            return Ok(());
        }
        Commands::Tc => {
            let text = read_stdin()?;
            println!("{}", tokenizer.count_tokens(&text));
            return Ok(());
        }
        Commands::Msg { sysmsg } => {
            let provider = create_provider(&cfg.provider)?;
            let input = read_stdin()?;
            let resp = commands::msg(
                provider.as_ref(),
                tokenizer.as_ref(),
                sysmsg,
                &input,
                cfg.provider.context_window,
            )
            .await?;
            println!("{}", resp);
            return Ok(());
        }
        _ => {}
    }

    let provider = create_provider(&cfg.provider)?;
    let store_path = Session::find(Path::new("."), &cfg.store.name)?;
    let mode = cli.command.lock_mode();
    let mut session = Session::open(
        &store_path,
        mode,
        &cfg,
        Arc::clone(&tokenizer),
        provider.as_ref(),
    )
    .await?;
    if let Some(backup) = session.migration_backup() {
        info!(backup = %backup.display(), "store migrated");
        // persist the migration even if the command itself changes nothing
        session.save()?;
    }

    run(cli.command, &mut session, &cfg, provider.as_ref(), tokenizer).await
}

async fn run(
    command: Commands,
    session: &mut Session,
    cfg: &Config,
    provider: &dyn Provider,
    tokenizer: Arc<dyn Tokenizer>,
) -> Result<()> {
    let rag = |global: bool| RagOptions {
        context_window: cfg.provider.context_window,
        global,
        context: ContextOptions::default(),
    };

    match command {
        Commands::Add { paths } => {
            let mut changed = 0;
            for path in &paths {
                if session.store_mut().add_document(provider, path).await? {
                    changed += 1;
                }
            }
            session.save()?;
            println!("Updated {} of {} documents.", changed, paths.len());
        }
        Commands::Forget { paths } => {
            for path in &paths {
                if !session.store_mut().forget_document(path) {
                    warn!(document = %path, "not in store");
                }
            }
            let removed = session.store_mut().gc();
            session.save()?;
            println!("Removed {} chunks.", removed);
        }
        Commands::Refresh => {
            session.store_mut().refresh_all(provider).await?;
            session.save()?;
            println!(
                "Refreshed {} documents ({} chunks).",
                session.store().documents().len(),
                session.store().chunks().len()
            );
        }
        Commands::Ls => {
            for doc in session.store().documents() {
                println!("{}", doc.rel_path);
            }
        }
        Commands::Gc => {
            let removed = session.store_mut().gc();
            session.save()?;
            println!("Removed {} chunks.", removed);
        }
        Commands::Ctx {
            query,
            limit,
            headers,
            line_numbers,
            files,
        } => {
            let opts = ContextOptions {
                with_headers: headers,
                with_line_numbers: line_numbers,
                files: if files.is_empty() { None } else { Some(files) },
            };
            let limit = limit.unwrap_or(cfg.provider.context_window / 2);
            let ctx = search::context(session.store_mut(), provider, &query, limit, &opts).await?;
            print!("{}", ctx);
        }
        Commands::Q { question, global } => {
            session.refresh_changed(provider).await?;
            let resp = commands::answer(session.store_mut(), provider, &question, &rag(global)).await?;
            session.save()?;
            println!("{}", resp);
        }
        Commands::Revise { global, sysmsg_in } => {
            let input = read_stdin()?;
            session.refresh_changed(provider).await?;
            let out =
                commands::revise(session.store_mut(), provider, &input, sysmsg_in, &rag(global)).await?;
            session.save()?;
            println!("{}", out);
        }
        Commands::Continue { global } => {
            let input = read_stdin()?;
            session.refresh_changed(provider).await?;
            let out = commands::continue_text(session.store_mut(), provider, &input, &rag(global)).await?;
            session.save()?;
            println!("{}", out);
        }
        Commands::Chat {
            file,
            prompt,
            sysmsg,
            context_level,
            token_limit,
            input_files,
            no_add_to_store,
        } => {
            let prompt = match prompt {
                Some(p) => p,
                None => read_stdin()?,
            };
            if prompt.trim().is_empty() {
                bail!("empty prompt");
            }
            session.refresh_changed(provider).await?;

            let mut history = ChatHistory::open(&file, sysmsg.as_deref(), &cfg.chat.sysmsg)?;
            let opts = ChatOptions {
                context_level: context_level.unwrap_or(cfg.chat.context_level),
                token_limit: token_limit.unwrap_or(cfg.chat.prompt_token_limit),
                context_window: cfg.provider.context_window,
                summary_mode: cfg.chat.summary_mode,
            };
            let reply = continue_chat(
                &mut history,
                session.store_mut(),
                provider,
                tokenizer.as_ref(),
                &prompt,
                &input_files,
                opts,
            )
            .await?;
            history.save()?;
            info!(
                peak_tokens = reply.peak_tokens,
                final_tokens = reply.final_tokens,
                "chat turn complete"
            );

            if !no_add_to_store {
                add_to_store(&history, session.store_mut(), provider).await?;
            }
            session.save()?;
            println!("{}", reply.response);
        }
        Commands::Embed { text } => {
            let text = match text {
                Some(t) => t,
                None => read_stdin()?,
            };
            println!("{}", commands::embed_json(provider, &text).await?);
        }
        Commands::Similarity { reference, texts } => {
            let scores = commands::similarity(session.store(), provider, &reference, &texts).await?;
            for score in scores {
                println!("{}", score);
            }
        }
        Commands::Backup => {
            println!("{}", session.backup()?.display());
        }
        Commands::Init { .. } | Commands::Tc | Commands::Msg { .. } | Commands::Version => {
            // Handled above (before opening the store)
            unreachable!()
        }
    }

    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}
