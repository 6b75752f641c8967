use crate::cli::{Cli, Commands};
use crate::config::CliConfig;
use crate::options::{
    Origin, RegisterOptions, Schema, SchemaDescriptor, SchemaEntry, UserSelfServicePolicy,
    Validator, WarningSink,
};
use crate::storage::{HostPlatform, SqlitePlatform, StorageFactory};
use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::Confirm;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Entry point of the binary
pub fn run(cli: Cli) -> Result<()> {
    let mut config = CliConfig::load()?;
    apply_flags(&mut config, &cli);

    let db_path = config.database_path()?;
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
            log::info!("Created database directory: {:?}", parent);
        }
    }

    let platform = SqlitePlatform::open(&db_path)?;
    platform.set_current_blog(config.current_blog);
    let mut session = OptionsSession::open(&config, Arc::new(platform))?;

    match cli.command {
        Commands::Show => show_command(&session),
        Commands::Get { key } => get_command(&session, &key),
        Commands::Set { key, value } => set_command(&mut session, &key, &value),
        Commands::Delete { key } => delete_command(&mut session, &key),
        Commands::ResetAll { force } => reset_all_command(&mut session, force),
        Commands::Schema => schema_command(&session),
        Commands::Seed => seed_command(&mut session),
    }
}

/// Command-line flags win over file and environment settings
pub fn apply_flags(config: &mut CliConfig, cli: &Cli) {
    if let Some(db) = &cli.db {
        config.database = Some(db.clone());
    }
    if let Some(record) = &cli.record {
        config.record = record.clone();
    }
    if let Some(scope) = &cli.scope {
        config.scope = scope.clone();
    }
    if cli.blog_id.is_some() {
        config.blog_id = cli.blog_id;
    }
    if cli.user_id.is_some() {
        config.user_id = cli.user_id;
    }
    if let Some(kind) = &cli.user_storage {
        config.user_storage = Some(kind.clone());
    }
    if let Some(schema) = &cli.schema {
        config.schema = Some(schema.clone());
    }
}

/// One options record opened for the command line
///
/// Without a schema file every key is accepted as any JSON value.
pub struct OptionsSession {
    pub options: RegisterOptions,
    schemaless: bool,
}

impl OptionsSession {
    pub fn open(config: &CliConfig, platform: Arc<dyn HostPlatform>) -> Result<Self> {
        let factory = StorageFactory::new(platform);
        let context = config.storage_context()?;

        let mut builder = RegisterOptions::builder(&config.record).context(context);
        if let Some(autoload) = config.autoload {
            builder = builder.autoload(autoload);
        }
        if let Some(user) = config.acting_user {
            builder = builder.policy(UserSelfServicePolicy::new(
                user,
                config.self_service_keys.iter().cloned(),
            ));
        }
        if let Some(path) = &config.schema {
            builder = builder.schema(load_schema(path)?);
        }

        let options = builder
            .build(&factory)
            .with_context(|| format!("Failed to open options record '{}'", config.record))?;

        let mut session = Self {
            options,
            schemaless: config.schema.is_none(),
        };
        if session.schemaless {
            let stored: Vec<String> = session.options.get_options().keys().cloned().collect();
            for key in stored {
                session.ensure_registered(&key)?;
            }
        }
        Ok(session)
    }

    pub fn is_schemaless(&self) -> bool {
        self.schemaless
    }

    fn ensure_registered(&mut self, key: &str) -> Result<()> {
        if !self.schemaless || self.options.schema().contains(key) {
            return Ok(());
        }
        log::debug!("No schema loaded, accepting any value for '{}'", key);
        self.options.register_schema(
            Schema::new().option(key, SchemaEntry::new().validator(any_value())),
        )?;
        Ok(())
    }

    /// Parse and persist one value
    pub fn set(&mut self, key: &str, raw: &str) -> Result<bool> {
        self.ensure_registered(key)?;
        Ok(self.options.set_option(key, parse_value(raw))?)
    }
}

fn any_value() -> Validator {
    Validator::named("any_value", |_: &Value, _: &mut WarningSink| true)
}

/// Load a TOML or JSON schema descriptor
pub fn load_schema(path: &Path) -> Result<Schema> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file: {:?}", path))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let descriptor = if is_json {
        SchemaDescriptor::from_json_str(&text)
    } else {
        SchemaDescriptor::from_toml_str(&text)
    }
    .with_context(|| format!("Invalid schema file: {:?}", path))?;

    Ok(descriptor.into_schema()?)
}

/// JSON if it parses, otherwise the raw text as a string
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn render(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

fn print_messages(session: &mut OptionsSession) {
    let messages = session.options.take_messages();
    for (key, entry) in messages.iter() {
        for warning in &entry.warnings {
            println!("  {} {}: {}", "warning".yellow(), key, warning);
        }
        for notice in &entry.notices {
            println!("  {} {}: {}", "notice".dimmed(), key, notice);
        }
    }
}

fn show_command(session: &OptionsSession) -> Result<()> {
    let options = &session.options;
    let ctx = options.storage_context();

    println!(
        "{} {} ({} scope{})",
        "Record:".bold(),
        options.record_name().cyan(),
        ctx.scope,
        ctx.entity_id.map(|id| format!(" #{}", id)).unwrap_or_default()
    );
    if !options.record_exists() {
        println!("{}", "Record does not exist yet; showing defaults".dimmed());
    }
    println!("{}", "=".repeat(40));

    let values = options.get_options();
    if values.is_empty() {
        println!("{}", "No options set".dimmed());
        return Ok(());
    }

    for (key, value) in &values {
        let origin = match options.staged(key).map(|staged| staged.origin) {
            Some(Origin::Seed) => " (default)".dimmed().to_string(),
            _ => String::new(),
        };
        println!("  {}: {}{}", key.cyan(), render(value), origin);
    }

    println!();
    println!("Use 'register-options set <key> <value>' to change an option");
    println!("Use 'register-options delete <key>' to remove an option");
    Ok(())
}

fn get_command(session: &OptionsSession, key: &str) -> Result<()> {
    match session.options.get_option(key) {
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => anyhow::bail!("Option '{}' is not set", key),
    }
}

fn set_command(session: &mut OptionsSession, key: &str, raw: &str) -> Result<()> {
    let persisted = session.set(key, raw);
    print_messages(session);

    if persisted? {
        let value = session.options.get_option(key).unwrap_or(Value::Null);
        println!("{}", format!("✓ Set {} = {}", key, render(&value)).green());
    } else {
        println!(
            "{}",
            format!("✗ '{}' was not saved: write denied or refused by storage", key).yellow()
        );
    }
    Ok(())
}

fn delete_command(session: &mut OptionsSession, key: &str) -> Result<()> {
    if session.options.delete_option(key)? {
        println!("{}", format!("✓ Deleted {}", key).green());
    } else {
        println!(
            "{}",
            format!("✗ '{}' was not deleted: write denied or refused by storage", key).yellow()
        );
    }
    Ok(())
}

fn reset_all_command(session: &mut OptionsSession, force: bool) -> Result<()> {
    let confirmed = if force {
        true
    } else {
        Confirm::new()
            .with_prompt(format!(
                "Remove every option from '{}'?",
                session.options.record_name()
            ))
            .default(false)
            .interact()?
    };

    if !confirmed {
        println!("{}", "Reset cancelled".yellow());
        return Ok(());
    }

    if session.options.clear()? {
        println!("{}", "✓ All options removed".green());
    } else {
        println!("{}", "✗ Reset was denied or refused by storage".yellow());
    }
    Ok(())
}

fn schema_command(session: &OptionsSession) -> Result<()> {
    let registry = session.options.schema();
    if session.is_schemaless() {
        println!("{}", "No schema file loaded; every key accepts any JSON value".dimmed());
    }
    if registry.is_empty() {
        println!("{}", "No options registered".dimmed());
        return Ok(());
    }

    for entry in registry.iter() {
        let summary = entry.summary();
        println!("{}", summary.key.cyan().bold());
        if let Some(description) = &summary.description {
            println!("  {}", description);
        }
        if let Some(default) = entry.default_value() {
            println!("  default: {}", render(default));
        }
        for (bucket, kind) in &summary.sanitizers {
            println!("  sanitize [{}]: {}", bucket, kind);
        }
        for (bucket, kind) in &summary.validators {
            println!("  validate [{}]: {}", bucket, kind);
        }
    }
    Ok(())
}

fn seed_command(session: &mut OptionsSession) -> Result<()> {
    if session.options.record_exists() {
        println!("{}", "Record already exists; nothing to seed".dimmed());
        return Ok(());
    }
    if session.options.seed_if_missing()? {
        println!("{}", "✓ Defaults written".green());
    } else {
        println!("{}", "✗ Seeding was denied or refused by storage".yellow());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryPlatform;
    use clap::Parser;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("3"), json!(3));
        assert_eq!(parse_value("[1, 2]"), json!([1, 2]));
        assert_eq!(parse_value("\"quoted\""), json!("quoted"));
        assert_eq!(parse_value("plain text"), json!("plain text"));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "register-options",
            "--record",
            "flagged",
            "--scope",
            "blog",
            "--blog-id",
            "4",
            "show",
        ]);
        let mut config = CliConfig::default();
        apply_flags(&mut config, &cli);

        assert_eq!(config.record, "flagged");
        assert_eq!(config.storage_context().unwrap().entity_id, Some(4));
    }

    #[test]
    fn test_schemaless_session_accepts_any_key() {
        let platform = Arc::new(MemoryPlatform::new());
        let config = CliConfig::default();
        let mut session = OptionsSession::open(&config, platform.clone()).unwrap();

        assert!(session.is_schemaless());
        assert!(session.set("color", "\"blue\"").unwrap());

        let reopened = OptionsSession::open(&config, platform).unwrap();
        assert_eq!(reopened.options.get_option("color"), Some(json!("blue")));
        assert!(reopened.options.schema().contains("color"));
    }
}
