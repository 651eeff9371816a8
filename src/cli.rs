//! Maintenance commands for a cache data directory
//!
//! Offline tooling that works directly against the persisted artifacts, no
//! model access required: inspect what is cached, check that the four files
//! agree on row count, and rebuild the derived index after a corruption.

use crate::cache::SemanticCache;

pub enum Command {
    Count,
    List,
    Get { id: String },
    Verify,
    Rebuild,
}

/// Parse a maintenance command from an argument vector
pub fn parse_command_from_args(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("No command provided. Use: serve, count, list, get, verify, rebuild".to_string());
    }

    let command = &args[1];

    match command.as_str() {
        "count" => Ok(Command::Count),
        "list" => Ok(Command::List),
        "verify" => Ok(Command::Verify),
        "rebuild" => Ok(Command::Rebuild),
        "get" => {
            // args[2] = record id (required)
            if args.len() < 3 {
                return Err("'get' requires a record id. Usage: semcache get <id>".to_string());
            }
            Ok(Command::Get { id: args[2].clone() })
        }
        _ => Err(format!(
            "Unknown command: {}. Available: serve, count, list, get, verify, rebuild",
            command
        )),
    }
}

/// Runs a maintenance command and returns the process exit code, so scripted
/// callers can detect a miss, misalignment or failed rebuild.
pub fn execute_command(cache: &SemanticCache, command: Command) -> i32 {
    match command {
        Command::Count => {
            println!("{}", cache.count());
            0
        }

        Command::List => {
            let records = cache.all_records();
            if records.is_empty() {
                println!("Cache is empty");
            } else {
                for record in &records {
                    println!("{}  {}", record.id, record.question);
                }
                println!("Total: {} records", records.len());
            }
            0
        }

        Command::Get { id } => {
            match cache.answer_by_id(&id) {
                Some(answer) => {
                    println!("{}", answer);
                    0
                }
                None => {
                    eprintln!("Error: no record with id '{}'", id);
                    1
                }
            }
        }

        Command::Verify => {
            let status = cache.status();
            println!("records:    {}", status.records);
            println!("metadata:   {}", status.metadata);
            println!("embeddings: {}", status.embedding_rows);
            println!("index:      {}", status.index_rows);
            if status.aligned() {
                println!("Stores are aligned");
                0
            } else {
                eprintln!("Stores are MISALIGNED; run 'rebuild' or insert to repair");
                1
            }
        }

        Command::Rebuild => {
            match cache.rebuild_index() {
                Ok(rows) => {
                    println!("Index rebuilt ({} rows)", rows);
                    0
                }
                Err(error) => {
                    eprintln!("Error: {}", error);
                    1
                }
            }
        }
    }
}
