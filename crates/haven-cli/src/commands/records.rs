use chrono::{DateTime, Utc};
use haven_core::models::{validate_payload, PushKeys, PushSubscription, Reminder};
use haven_core::util::normalize_text_option;
use haven_core::Record;
use serde_json::Value;

use crate::cli::{PushCommands, ReminderCommands};
use crate::commands::common::{
    format_record_line, parse_collection, split_save_args, CliContext,
};
use crate::error::CliError;

pub async fn run_save(
    collection: &str,
    args: &[String],
    context: &CliContext,
) -> Result<(), CliError> {
    let collection = parse_collection(collection)?;
    let (key, payload) = split_save_args(args)?;
    let payload: Value = serde_json::from_str(&payload)
        .map_err(|error| CliError::InvalidArgument(format!("payload is not valid JSON: {error}")))?;
    validate_payload(collection.as_str(), &payload)?;

    let coordinator = context.coordinator().await?;
    let key = key.unwrap_or_else(Record::generate_key);
    let record = coordinator.save_local(&collection, &key, payload)?;
    coordinator.flush().await;

    println!("Saved {}/{}", collection, record.key);
    Ok(())
}

pub async fn run_delete(collection: &str, key: &str, context: &CliContext) -> Result<(), CliError> {
    let collection = parse_collection(collection)?;
    let coordinator = context.coordinator().await?;
    if coordinator.get(&collection, key)?.is_none() {
        return Err(CliError::KeyNotFound(format!("{collection}/{key}")));
    }

    coordinator.delete_local(&collection, key)?;
    coordinator.flush().await;
    println!("Deleted {collection}/{key}");
    Ok(())
}

pub async fn run_list(collection: &str, as_json: bool, context: &CliContext) -> Result<(), CliError> {
    let collection = parse_collection(collection)?;
    let coordinator = context.coordinator().await?;
    let records = coordinator.list(&collection)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records in '{collection}'.");
        return Ok(());
    }

    for record in &records {
        println!("{}", format_record_line(record));
    }
    Ok(())
}

pub async fn run_reminder(command: ReminderCommands, context: &CliContext) -> Result<(), CliError> {
    let coordinator = context.coordinator().await?;
    match command {
        ReminderCommands::Add { title, due, notes } => {
            let mut reminder = Reminder::new(title);
            reminder.notes = normalize_text_option(notes);
            reminder.due_at = due.as_deref().map(parse_due_time).transpose()?;

            let record = coordinator.save_typed(None, &reminder)?;
            coordinator.flush().await;
            println!("Added reminder {}", record.key);
        }
        ReminderCommands::List { due } => {
            let now = Utc::now();
            let reminders = coordinator
                .list_typed::<Reminder>()?
                .into_iter()
                .filter(|(_, reminder)| !due || reminder.is_due(now))
                .collect::<Vec<_>>();

            if reminders.is_empty() {
                println!("No reminders.");
                return Ok(());
            }
            for (key, reminder) in reminders {
                println!("{}", format_reminder_line(&key, &reminder));
            }
        }
    }
    Ok(())
}

pub async fn run_push(command: PushCommands, context: &CliContext) -> Result<(), CliError> {
    match command {
        PushCommands::Register {
            endpoint,
            p256dh,
            auth,
            user_agent,
        } => {
            let subscription = PushSubscription {
                endpoint,
                keys: PushKeys { p256dh, auth },
                user_agent: normalize_text_option(user_agent),
            };
            let coordinator = context.coordinator().await?;
            let key = subscription.record_key();
            let record = coordinator.save_typed(Some(key.as_str()), &subscription)?;
            coordinator.flush().await;
            println!("Registered push endpoint {}", record.key);
        }
    }
    Ok(())
}

pub fn parse_due_time(value: &str) -> Result<DateTime<Utc>, CliError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|due| due.with_timezone(&Utc))
        .map_err(|error| CliError::InvalidArgument(format!("invalid due time '{value}': {error}")))
}

pub fn format_reminder_line(key: &str, reminder: &Reminder) -> String {
    let status = if reminder.completed { "done" } else { "open" };
    let due = reminder.due_at.map_or_else(
        || "-".to_string(),
        |due_at| due_at.format("%Y-%m-%d %H:%M UTC").to_string(),
    );
    format!("{key:<36}  {status:<4}  {due:<20}  {}", reminder.title)
}
