//! Line commands accepted by the terminal client.

use anyhow::bail;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Analyze(String),
    Set { field: String, value: String },
    Fields,
    Score,
    Reset,
    Status,
    Chat(String),
    Cancel,
    Clear,
    Help,
    Quit,
    Nothing,
}

pub const HELP: &str = "\
Commands:
  analyze <url>         analyze a video URL (step 1)
  set <field> <value>   edit a manual attribute (step 2)
  fields                list manual attributes and allowed values
  score                 request the dopamine prediction (step 3)
  reset                 start the analyzer over
  status                show analyzer and chat state
  chat <text>           ask the assistant; replies stream in
  cancel                stop the streaming reply
  clear                 clear the chat history
  help                  show this help
  quit                  exit";

pub fn parse(line: &str) -> anyhow::Result<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "" => Command::Nothing,
        "analyze" => {
            if rest.is_empty() {
                bail!("usage: analyze <url>");
            }
            Command::Analyze(rest.to_string())
        }
        "set" => match rest.split_once(char::is_whitespace) {
            Some((field, value)) => Command::Set {
                field: field.to_string(),
                value: value.trim().to_string(),
            },
            None => bail!("usage: set <field> <value>"),
        },
        "chat" => Command::Chat(rest.to_string()),
        "fields" => Command::Fields,
        "score" => Command::Score,
        "reset" => Command::Reset,
        "status" => Command::Status,
        "cancel" => Command::Cancel,
        "clear" => Command::Clear,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command: {other} (try 'help')"),
    };
    Ok(command)
}
