//! Status-derived view state. Everything here is a pure function of the
//! latest snapshot; nothing is cached or mutated.

use serde::Serialize;

use crate::schema::{Model, ModelStatus, Server, ServerStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Info,
    Warning,
    Success,
    Error,
    Default,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ModelActions {
    pub download: bool,
    pub load: bool,
    pub unload: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ServerActions {
    pub start: bool,
    pub stop: bool,
    pub health: bool,
}

pub fn model_actions(model: &Model) -> ModelActions {
    let ready = model.status == Some(ModelStatus::Ready);
    ModelActions {
        download: matches!(model.status, None | Some(ModelStatus::Error)),
        load: ready,
        unload: ready,
    }
}

pub fn server_actions(server: &Server) -> ServerActions {
    ServerActions {
        start: !matches!(server.status, ServerStatus::Running | ServerStatus::Starting),
        stop: server.status != ServerStatus::Stopped,
        health: server.status == ServerStatus::Running,
    }
}

pub fn model_status_color(status: Option<ModelStatus>) -> StatusColor {
    match status {
        Some(ModelStatus::Downloading) => StatusColor::Info,
        Some(ModelStatus::Loading) | Some(ModelStatus::Unloading) => StatusColor::Warning,
        Some(ModelStatus::Ready) => StatusColor::Success,
        Some(ModelStatus::Error) => StatusColor::Error,
        None => StatusColor::Default,
    }
}

pub fn server_status_color(status: ServerStatus) -> StatusColor {
    match status {
        ServerStatus::Starting => StatusColor::Warning,
        ServerStatus::Running => StatusColor::Success,
        ServerStatus::Stopped | ServerStatus::Error => StatusColor::Error,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelCard {
    pub title: String,
    pub status: String,
    pub color: StatusColor,
    pub error: Option<String>,
    pub actions: ModelActions,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServerCard {
    pub title: String,
    pub subtitle: String,
    pub status: String,
    pub color: StatusColor,
    pub error: Option<String>,
    pub actions: ServerActions,
}

impl From<&Model> for ModelCard {
    fn from(m: &Model) -> Self {
        Self {
            title: m.name.clone(),
            status: m.status.map(|s| s.as_str()).unwrap_or("unknown").to_string(),
            color: model_status_color(m.status),
            error: m.error.as_ref().map(|e| format!("Error: {e}")),
            actions: model_actions(m),
        }
    }
}

impl From<&Server> for ServerCard {
    fn from(s: &Server) -> Self {
        let short: String = s.id.chars().take(8).collect();
        Self {
            title: format!("Server {short}"),
            subtitle: format!("{} - Port {}", s.config.model_name, s.config.port),
            status: s.status.as_str().to_string(),
            color: server_status_color(s.status),
            error: s.error.as_ref().map(|e| format!("Error: {e}")),
            actions: server_actions(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ServerConfig;

    const MODEL_STATUSES: [Option<ModelStatus>; 6] = [
        None,
        Some(ModelStatus::Downloading),
        Some(ModelStatus::Loading),
        Some(ModelStatus::Ready),
        Some(ModelStatus::Unloading),
        Some(ModelStatus::Error),
    ];

    const SERVER_STATUSES: [ServerStatus; 4] = [
        ServerStatus::Starting,
        ServerStatus::Running,
        ServerStatus::Stopped,
        ServerStatus::Error,
    ];

    fn model(status: Option<ModelStatus>) -> Model {
        Model { name: "m1".into(), status, message: None, error: None }
    }

    fn server(status: ServerStatus) -> Server {
        Server {
            id: "0123456789abcdef".into(),
            status,
            config: ServerConfig::new("m1", 8001),
            error: None,
        }
    }

    #[test]
    fn test_load_only_when_ready() {
        for status in MODEL_STATUSES {
            let a = model_actions(&model(status));
            assert_eq!(a.load, status == Some(ModelStatus::Ready), "status {status:?}");
            assert_eq!(a.unload, a.load);
        }
    }

    #[test]
    fn test_download_only_when_error_or_unknown() {
        assert!(model_actions(&model(None)).download);
        assert!(model_actions(&model(Some(ModelStatus::Error))).download);
        assert!(!model_actions(&model(Some(ModelStatus::Ready))).download);
        assert!(!model_actions(&model(Some(ModelStatus::Downloading))).download);
    }

    #[test]
    fn test_stop_unless_stopped() {
        for status in SERVER_STATUSES {
            assert_eq!(server_actions(&server(status)).stop, status != ServerStatus::Stopped);
        }
    }

    #[test]
    fn test_health_and_start_rules() {
        for status in SERVER_STATUSES {
            let a = server_actions(&server(status));
            assert_eq!(a.health, status == ServerStatus::Running);
            assert_eq!(a.start, matches!(status, ServerStatus::Stopped | ServerStatus::Error));
        }
    }

    #[test]
    fn test_server_card_text() {
        let mut s = server(ServerStatus::Error);
        s.error = Some("port in use".into());
        let card = ServerCard::from(&s);
        assert_eq!(card.title, "Server 01234567");
        assert_eq!(card.subtitle, "m1 - Port 8001");
        assert_eq!(card.color, StatusColor::Error);
        assert_eq!(card.error.as_deref(), Some("Error: port in use"));
    }

    #[test]
    fn test_model_card_unknown_status() {
        let card = ModelCard::from(&model(None));
        assert_eq!(card.status, "unknown");
        assert_eq!(card.color, StatusColor::Default);
    }
}
