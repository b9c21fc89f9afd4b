mod cli;
mod db;
mod duplicates;
mod error;
mod fmt;
mod ledger;
mod match_engine;
mod matches;
mod models;
mod reader;
mod replace;
mod rowparse;
mod session;
mod settings;

use clap::{CommandFactory, Parser};

use cli::{
    Cli, Commands, LedgerCommands, MatchesCommands, ProgramsCommands, SessionsCommands,
};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Programs { command } => match command {
            ProgramsCommands::Add {
                code,
                name,
                default,
            } => cli::programs::add(&code, &name, default),
            ProgramsCommands::List => cli::programs::list(),
        },
        Commands::Ledger { command } => match command {
            LedgerCommands::Load { file, program } => {
                cli::ledger::load(&file, program.as_deref())
            }
            LedgerCommands::Add {
                program,
                vendor,
                amount,
                date,
                description,
                category,
            } => cli::ledger::add(
                program.as_deref(),
                &vendor,
                amount,
                &date,
                description.as_deref(),
                category.as_deref(),
            ),
            LedgerCommands::List { program } => cli::ledger::list(program.as_deref()),
        },
        Commands::Import {
            file,
            program,
            mapping,
        } => cli::import::run(&file, program.as_deref(), mapping.as_deref()),
        Commands::Sessions { command } => match command {
            SessionsCommands::List { program } => cli::sessions::list(program.as_deref()),
            SessionsCommands::Show { id } => cli::sessions::show(id),
            SessionsCommands::Cancel { id } => cli::sessions::cancel(id),
        },
        Commands::Matches { command } => match command {
            MatchesCommands::List { transaction_id } => cli::review::list(transaction_id),
            MatchesCommands::Confirm {
                transaction_id,
                ledger_entry_id,
            } => cli::review::confirm(transaction_id, ledger_entry_id),
            MatchesCommands::Reject {
                transaction_id,
                ledger_entry_id,
            } => cli::review::reject(transaction_id, ledger_entry_id),
            MatchesCommands::UndoReject {
                transaction_id,
                ledger_entry_id,
            } => cli::review::undo_reject(transaction_id, ledger_entry_id),
            MatchesCommands::Remove { transaction_id } => cli::review::remove(transaction_id),
            MatchesCommands::AddToLedger { transaction_id } => {
                cli::review::add_to_ledger(transaction_id)
            }
        },
        Commands::Replace {
            session_id,
            file,
            force,
            preserve_all,
            preserve_confirmed,
        } => cli::replace::run(session_id, &file, force, preserve_all, preserve_confirmed),
        Commands::Status => cli::status::run(),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "matchbook",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
