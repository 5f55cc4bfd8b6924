use std::{error::Error, path::Path, process::exit};

use clap::Parser;
use rusqlite::Connection;

use spendtrack::{create_user, generate_api_key, hash_api_key, initialize_db};

/// A utility for provisioning a user and handing out their API key.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The name of the user to create.
    #[arg(long)]
    name: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let db_path = Path::new(&args.db_path);
    validate_db_path(db_path);

    let connection = Connection::open(db_path)?;
    initialize_db(&connection)?;

    let api_key = generate_api_key(&connection)?;
    let user = create_user(&args.name, &hash_api_key(&api_key), &connection)?;

    println!("Created user {} with ID {}.", user.name, user.id);
    println!();
    println!("API key (shown once, only its hash is stored):");
    println!("{api_key}");

    Ok(())
}

fn validate_db_path(db_path: &Path) {
    match db_path.extension() {
        None => {
            eprintln!("Database path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Database path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }
}
