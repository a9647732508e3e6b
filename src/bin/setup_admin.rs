//! Interactive bootstrap for the first admin account. Run once against a
//! fresh database; later admins can be created through the API instead.

use std::io::{self, BufRead, Write};
use std::process::exit;

use slotmark_backend::data::user::db::UserDbExt;
use slotmark_backend::data::user::User;
use slotmark_backend::role::Role;
use tracing::Level;

fn prompt(question: &str) -> io::Result<String> {
    print!("{}", question);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn confirmed(answer: &str) -> bool {
    matches!(answer.to_lowercase().as_str(), "y" | "yes")
}

#[rocket::main]
async fn main() {
    slotmark_backend::init_logging(Some(Level::WARN));

    let config = match slotmark_backend::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            exit(1)
        }
    };

    let db = match slotmark_backend::connect_database(&config).await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Unable to connect to MongoDB: {}", e);
            exit(1)
        }
    };
    println!("Connected to MongoDB.\n");

    let admins = match db.count_admins().await {
        Ok(n) => n,
        Err(e) => {
            eprintln!("Unable to query admin accounts: {}", e);
            exit(1)
        }
    };

    if admins > 0 {
        println!("Admin account(s) already exist in the database.");
        let answer = prompt("Do you want to create another admin? (yes/no): ")
            .unwrap_or_default();
        if !confirmed(&answer) {
            println!("Setup cancelled.");
            return;
        }
    }

    let email = prompt("Admin email: ").unwrap_or_default();
    let full_name = prompt("Full name: ").unwrap_or_default();
    let password = prompt("Password (min 8 characters): ").unwrap_or_default();

    if !email.contains('@') || full_name.is_empty() || password.len() < 8 {
        eprintln!("Invalid input; admin account not created.");
        exit(1)
    }

    match db
        .insert_account(User::new(&email, &full_name, &password, Role::Admin))
        .await
    {
        Ok(user) => {
            println!("\nAdmin account created:");
            println!("  id:    {}", user.id);
            println!("  email: {}", user.email);
        }
        Err(e) => {
            eprintln!("Unable to create admin account: {}", e);
            exit(1)
        }
    }
}
