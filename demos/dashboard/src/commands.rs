use modelops::{Intent, ModelAction, ServerAction, ServerConfig};

#[derive(Debug, PartialEq)]
pub enum Command {
    Intent(Intent),
    StartNew(ServerConfig),
    Query(String),
    Chat(String),
    Upload(String),
    /// Hub search; a term replaces the configured searches.
    Find(Option<String>),
    HubConfig(String),
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  download <model>            load <model> [gpu]        unload <model>
  start <server_id>           start <model> <port> [gpu]
  stop <server_id>            health <server_id>
  query <text>                chat <text>               upload <repo_url>
  find [term]                 config <hub_model_id>
  show                        help                      quit";

pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let args: Vec<&str> = rest.split_whitespace().collect();

    let model = |action| -> Result<Command, String> {
        let name = args.first().ok_or_else(|| format!("{verb}: missing model name"))?;
        Ok(Command::Intent(Intent::Model { name: name.to_string(), action }))
    };
    let server = |action| -> Result<Command, String> {
        let id = args.first().ok_or_else(|| format!("{verb}: missing server id"))?;
        Ok(Command::Intent(Intent::Server { id: id.to_string(), action }))
    };
    let text = |wrap: fn(String) -> Command| -> Result<Command, String> {
        if rest.is_empty() {
            return Err(format!("{verb}: missing argument"));
        }
        Ok(wrap(rest.to_string()))
    };

    match verb {
        "download" => model(ModelAction::Download),
        "load" => {
            let gpu_id = args.get(1).map(|g| g.parse::<u32>()).transpose().map_err(|_| "load: gpu must be a number")?;
            model(ModelAction::Load { gpu_id })
        }
        "unload" => model(ModelAction::Unload),
        "start" if args.len() >= 2 => {
            let port = args[1].parse::<u16>().map_err(|_| "start: port must be a number")?;
            let mut cfg = ServerConfig::new(args[0], port);
            cfg.gpu_id = args.get(2).map(|g| g.parse::<u32>()).transpose().map_err(|_| "start: gpu must be a number")?;
            Ok(Command::StartNew(cfg))
        }
        "start" => server(ServerAction::Start),
        "stop" => server(ServerAction::Stop),
        "health" => server(ServerAction::HealthCheck),
        "query" => text(Command::Query),
        "chat" => text(Command::Chat),
        "upload" => text(Command::Upload),
        "find" => Ok(Command::Find((!rest.is_empty()).then(|| rest.to_string()))),
        "config" => text(Command::HubConfig),
        "show" | "" => Ok(Command::Show),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command {other:?}, try `help`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_commands() {
        assert_eq!(
            parse("load m1 2").unwrap(),
            Command::Intent(Intent::Model { name: "m1".into(), action: ModelAction::Load { gpu_id: Some(2) } })
        );
        assert_eq!(
            parse("unload m1").unwrap(),
            Command::Intent(Intent::Model { name: "m1".into(), action: ModelAction::Unload })
        );
        assert!(parse("load").is_err());
        assert!(parse("load m1 gpu0").is_err());
    }

    #[test]
    fn test_start_forms() {
        assert_eq!(
            parse("start abc").unwrap(),
            Command::Intent(Intent::Server { id: "abc".into(), action: ServerAction::Start })
        );
        match parse("start m1 8001 0").unwrap() {
            Command::StartNew(cfg) => {
                assert_eq!(cfg.model_name, "m1");
                assert_eq!(cfg.port, 8001);
                assert_eq!(cfg.gpu_id, Some(0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_free_text_commands() {
        assert_eq!(parse("query  what is this repo ").unwrap(), Command::Query("what is this repo".into()));
        assert!(parse("chat").is_err());
        assert_eq!(parse("find").unwrap(), Command::Find(None));
        assert_eq!(parse("find coder").unwrap(), Command::Find(Some("coder".into())));
        assert_eq!(parse("config Qwen/Qwen2.5-Coder-14B-Instruct").unwrap(), Command::HubConfig("Qwen/Qwen2.5-Coder-14B-Instruct".into()));
        assert!(parse("config").is_err());
        assert_eq!(parse("").unwrap(), Command::Show);
        assert!(parse("reboot").is_err());
    }
}
