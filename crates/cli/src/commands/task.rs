//! `pulsebot task list` — show the configured scheduled producers.

use pulsebot_config::Config;
use pulsebot_schedule::describe_tasks;

use super::CommandResult;

pub fn list(config: &Config) -> CommandResult {
    println!("{:<16} {:<10} schedule", "task", "enabled");
    for (name, enabled, schedule) in describe_tasks(&config.scheduled_tasks) {
        println!(
            "{:<16} {:<10} {}",
            name,
            if enabled { "yes" } else { "no" },
            schedule
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_succeeds_on_default_config() {
        assert!(list(&Config::default()).is_ok());
    }
}
