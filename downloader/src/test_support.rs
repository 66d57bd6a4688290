/// Local HTTP fixtures and scripted prompts for downloader tests.
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::Router;

use htmc_ws_shared::prompt::Confirm;

#[derive(Clone, Default)]
struct Fixtures {
    routes: Arc<HashMap<String, (StatusCode, Vec<u8>)>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

async fn serve_fixture(State(fixtures): State<Fixtures>, uri: Uri) -> (StatusCode, Vec<u8>) {
    let path = uri.path().to_string();
    *fixtures.hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;
    match fixtures.routes.get(&path) {
        Some((status, body)) => (*status, body.clone()),
        None => (StatusCode::NOT_FOUND, Vec::new()),
    }
}

#[derive(Default)]
pub struct FixtureBuilder {
    routes: HashMap<String, (StatusCode, Vec<u8>)>,
}

impl FixtureBuilder {
    pub fn route(mut self, path: &str, status: u16, body: impl AsRef<[u8]>) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        self.routes.insert(path.to_string(), (status, body.as_ref().to_vec()));
        self
    }

    /// Bind on an ephemeral loopback port and serve in the background.
    pub async fn spawn(self) -> FixtureServer {
        let fixtures = Fixtures {
            routes: Arc::new(self.routes),
            hits: Arc::default(),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .fallback(serve_fixture)
            .with_state(fixtures.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        FixtureServer { addr, fixtures }
    }
}

pub struct FixtureServer {
    addr: SocketAddr,
    fixtures: Fixtures,
}

impl FixtureServer {
    pub fn builder() -> FixtureBuilder {
        FixtureBuilder::default()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.fixtures.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.fixtures.hits.lock().unwrap().values().sum()
    }
}

/// Replays canned answers and records every prompt it was shown.
#[derive(Default)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            prompts: Mutex::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .expect("prompted more times than scripted")
    }
}
