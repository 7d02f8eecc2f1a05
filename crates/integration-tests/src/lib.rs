//! End-to-end tests for the vending storefront.
//!
//! The crate ships a [`FakeBackend`]: an in-process axum server on an
//! ephemeral port that plays both halves of the vending backend.
//!
//! - REST catalog and order endpoints under `/api`
//! - The machine hub under `/vendingMachineHub` (negotiate + websocket,
//!   JSON hub protocol), answering `TryLock` from a script and pushing
//!   machine notifications on demand
//!
//! Everything the storefront sends is recorded so tests can assert on it.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p vending-integration-tests
//! ```

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;
use vending_core::{Brand, BrandId, Drink, DrinkId};
use vending_storefront::api::{OrderReceipt, OrderRequest, PriceRange};
use vending_storefront::machine_lock::protocol::{
    HubMessage, RECORD_SEPARATOR, TRY_LOCK, parse_message, split_records,
};

/// Route of the machine hub on the fake backend.
pub const HUB_PATH: &str = "/vendingMachineHub";

/// How long the `wait_for_*` helpers poll before giving up.
const WAIT_LIMIT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// =============================================================================
// Fixtures
// =============================================================================

/// A brand fixture.
#[must_use]
pub fn brand(id: i32, name: &str) -> Brand {
    Brand {
        id: BrandId::new(id),
        name: name.to_string(),
    }
}

/// A drink fixture with `quantity` units in stock.
#[must_use]
pub fn drink(id: i32, name: &str, brand_id: i32, price: i64, quantity: u32) -> Drink {
    Drink {
        id: DrinkId::new(id),
        name: name.to_string(),
        price: Decimal::from(price),
        image_url: format!("/images/{id}.png"),
        brand: None,
        brand_id: BrandId::new(brand_id),
        quantity,
        stock: None,
    }
}

/// Two brands, four drinks priced 30 to 80.
#[must_use]
pub fn sample_catalog() -> (Vec<Drink>, Vec<Brand>) {
    let brands = vec![brand(1, "Coca-Cola"), brand(2, "Pepsi")];
    let drinks = vec![
        drink(1, "Coca-Cola Classic", 1, 45, 5),
        drink(2, "Sprite", 1, 30, 2),
        drink(3, "Pepsi", 2, 50, 4),
        drink(4, "Mirinda", 2, 80, 1),
    ];
    (drinks, brands)
}

/// What `POST /api/Orders` answers.
#[derive(Debug, Clone)]
pub enum OrderOutcome {
    /// 200 with this receipt.
    Accept(OrderReceipt),
    /// A failure status with `{"message": ..}`.
    Reject { status: StatusCode, message: String },
}

impl Default for OrderOutcome {
    fn default() -> Self {
        Self::Accept(OrderReceipt {
            change_coins: Vec::new(),
            change_amount: Decimal::ZERO,
            message: "Thank you for your purchase!".to_string(),
        })
    }
}

// =============================================================================
// Shared state
// =============================================================================

#[derive(Debug, Clone)]
enum HubCommand {
    Push(String),
    Close { allow_reconnect: bool },
    Drop,
}

struct Shared {
    drinks: Mutex<Vec<Drink>>,
    brands: Mutex<Vec<Brand>>,
    price_range_route: AtomicBool,
    import_text_reply: Mutex<Option<String>>,
    order_outcome: Mutex<OrderOutcome>,
    orders: Mutex<Vec<OrderRequest>>,
    requests: Mutex<Vec<String>>,
    try_lock_answers: Mutex<VecDeque<bool>>,
    hub_calls: Mutex<Vec<String>>,
    hub_sessions: Mutex<Vec<String>>,
    hub_connections: AtomicUsize,
    hub_commands: broadcast::Sender<HubCommand>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn record_request(&self, request: &str) {
        lock(&self.requests).push(request.to_string());
    }

    /// Next scripted `TryLock` answer; grants the lock once the script runs
    /// out.
    fn next_try_lock_answer(&self) -> bool {
        lock(&self.try_lock_answers).pop_front().unwrap_or(true)
    }

    /// Reply to one client record after the handshake.
    fn answer(&self, record: &str) -> Option<String> {
        match parse_message(record) {
            Ok(HubMessage::Invocation {
                invocation_id,
                target,
                ..
            }) => {
                tracing::debug!(target = %target, "Hub invocation");
                lock(&self.hub_calls).push(target.clone());
                let invocation_id = invocation_id?;
                let completion = if target == TRY_LOCK {
                    json!({"type": 3, "invocationId": invocation_id, "result": self.next_try_lock_answer()})
                } else {
                    json!({"type": 3, "invocationId": invocation_id})
                };
                Some(record_of(&completion))
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Fake hub got a malformed record");
                None
            }
        }
    }
}

fn record_of(value: &serde_json::Value) -> String {
    let mut record = value.to_string();
    record.push(RECORD_SEPARATOR);
    record
}

// =============================================================================
// FakeBackend
// =============================================================================

/// In-process fake of the vending backend.
///
/// The server runs until the value is dropped.
pub struct FakeBackend {
    api_url: Url,
    hub_url: Url,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl FakeBackend {
    /// Serve the sample catalog.
    ///
    /// # Errors
    ///
    /// Returns error if no local port can be bound.
    pub async fn start() -> std::io::Result<Self> {
        let (drinks, brands) = sample_catalog();
        Self::with_catalog(drinks, brands).await
    }

    /// Serve the given catalog.
    ///
    /// # Errors
    ///
    /// Returns error if no local port can be bound.
    pub async fn with_catalog(drinks: Vec<Drink>, brands: Vec<Brand>) -> std::io::Result<Self> {
        let (hub_commands, _) = broadcast::channel(16);
        let shared = Arc::new(Shared {
            drinks: Mutex::new(drinks),
            brands: Mutex::new(brands),
            price_range_route: AtomicBool::new(true),
            import_text_reply: Mutex::new(None),
            order_outcome: Mutex::new(OrderOutcome::default()),
            orders: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            try_lock_answers: Mutex::new(VecDeque::new()),
            hub_calls: Mutex::new(Vec::new()),
            hub_sessions: Mutex::new(Vec::new()),
            hub_connections: AtomicUsize::new(0),
            hub_commands,
        });

        let app = Router::new()
            .route("/api/Drinks", get(list_drinks))
            .route("/api/Drinks/filter", get(filter_drinks))
            .route("/api/Drinks/price-range", get(price_range))
            .route("/api/Drinks/ImportDrinks", post(import_drinks))
            .route("/api/Brands", get(list_brands))
            .route("/api/Orders", post(create_order))
            .route(&format!("{HUB_PATH}/negotiate"), post(negotiate))
            .route(HUB_PATH, get(hub_socket))
            .with_state(Arc::clone(&shared));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let api_url = local_url(addr, "/api")?;
        let hub_url = local_url(addr, HUB_PATH)?;
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Fake backend stopped");
            }
        });

        Ok(Self {
            api_url,
            hub_url,
            shared,
            task,
        })
    }

    /// Base URL of the REST API (`http://127.0.0.1:port/api`).
    #[must_use]
    pub fn api_url(&self) -> Url {
        self.api_url.clone()
    }

    /// URL of the machine hub.
    #[must_use]
    pub fn hub_url(&self) -> Url {
        self.hub_url.clone()
    }

    // -------------------------------------------------------------------------
    // Scripting
    // -------------------------------------------------------------------------

    /// Answers for the next `TryLock` calls, in order.
    pub fn script_try_lock(&self, answers: &[bool]) {
        lock(&self.shared.try_lock_answers).extend(answers.iter().copied());
    }

    /// Make the price-range route answer 404.
    pub fn disable_price_range(&self) {
        self.shared.price_range_route.store(false, Ordering::SeqCst);
    }

    /// Answer accepted imports with this `text/plain` body instead of a
    /// JSON report.
    pub fn set_import_text_reply(&self, text: &str) {
        *lock(&self.shared.import_text_reply) = Some(text.to_string());
    }

    pub fn set_order_outcome(&self, outcome: OrderOutcome) {
        *lock(&self.shared.order_outcome) = outcome;
    }

    /// Replace the catalog without going through the import route.
    pub fn set_drinks(&self, drinks: Vec<Drink>) {
        *lock(&self.shared.drinks) = drinks;
    }

    /// Push a machine notification (`MachineBusy`, `MachineLocked`,
    /// `MachineUnlocked`) to every connected client.
    pub fn push(&self, target: &str) {
        let _ = self.shared.hub_commands.send(HubCommand::Push(target.to_string()));
    }

    /// Send a close record to every connected client.
    pub fn close_hub(&self, allow_reconnect: bool) {
        let _ = self
            .shared
            .hub_commands
            .send(HubCommand::Close { allow_reconnect });
    }

    /// Drop every hub socket without a close handshake.
    pub fn drop_hub_connections(&self) {
        let _ = self.shared.hub_commands.send(HubCommand::Drop);
    }

    // -------------------------------------------------------------------------
    // Recordings
    // -------------------------------------------------------------------------

    /// How many times a REST route was hit, e.g. `"GET /Drinks"`.
    #[must_use]
    pub fn request_count(&self, request: &str) -> usize {
        lock(&self.shared.requests)
            .iter()
            .filter(|r| r.as_str() == request)
            .count()
    }

    /// Orders received, oldest first.
    #[must_use]
    pub fn orders(&self) -> Vec<OrderRequest> {
        lock(&self.shared.orders).clone()
    }

    /// Hub methods invoked by clients, oldest first.
    #[must_use]
    pub fn hub_calls(&self) -> Vec<String> {
        lock(&self.shared.hub_calls).clone()
    }

    #[must_use]
    pub fn hub_call_count(&self, target: &str) -> usize {
        lock(&self.shared.hub_calls)
            .iter()
            .filter(|t| t.as_str() == target)
            .count()
    }

    /// `sessionId` query values of every hub socket opened.
    #[must_use]
    pub fn hub_sessions(&self) -> Vec<String> {
        lock(&self.shared.hub_sessions).clone()
    }

    /// Completed hub handshakes.
    #[must_use]
    pub fn hub_connections(&self) -> usize {
        self.shared.hub_connections.load(Ordering::SeqCst)
    }

    /// Wait until `target` has been invoked `count` times.
    pub async fn wait_for_hub_calls(&self, target: &str, count: usize) -> bool {
        self.wait_until(|backend| backend.hub_call_count(target) >= count)
            .await
    }

    /// Wait until `count` handshakes have completed.
    pub async fn wait_for_hub_connections(&self, count: usize) -> bool {
        self.wait_until(|backend| backend.hub_connections() >= count)
            .await
    }

    async fn wait_until(&self, done: impl Fn(&Self) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        while tokio::time::Instant::now() < deadline {
            if done(self) {
                return true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        done(self)
    }
}

fn local_url(addr: SocketAddr, path: &str) -> std::io::Result<Url> {
    Url::parse(&format!("http://{addr}{path}")).map_err(std::io::Error::other)
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// REST handlers
// =============================================================================

async fn list_drinks(State(shared): State<Arc<Shared>>) -> Json<Vec<Drink>> {
    shared.record_request("GET /Drinks");
    Json(lock(&shared.drinks).clone())
}

fn of_brand(drinks: &[Drink], brand_id: Option<i32>) -> Vec<Drink> {
    drinks
        .iter()
        .filter(|d| brand_id.is_none_or(|id| d.brand_id.as_i32() == id))
        .cloned()
        .collect()
}

fn brand_param(query: &HashMap<String, String>) -> Result<Option<i32>, StatusCode> {
    query
        .get("BrandId")
        .map(|v| v.parse().map_err(|_| StatusCode::BAD_REQUEST))
        .transpose()
}

async fn filter_drinks(
    State(shared): State<Arc<Shared>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Drink>>, StatusCode> {
    shared.record_request("GET /Drinks/filter");
    let brand_id = brand_param(&query)?;
    let max_price: Option<Decimal> = query
        .get("MaxPrice")
        .map(|v| v.parse().map_err(|_| StatusCode::BAD_REQUEST))
        .transpose()?;

    let drinks = of_brand(&lock(&shared.drinks), brand_id)
        .into_iter()
        .filter(|d| max_price.is_none_or(|max| d.price <= max))
        .collect();
    Ok(Json(drinks))
}

async fn price_range(
    State(shared): State<Arc<Shared>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<PriceRange>, StatusCode> {
    shared.record_request("GET /Drinks/price-range");
    if !shared.price_range_route.load(Ordering::SeqCst) {
        return Err(StatusCode::NOT_FOUND);
    }
    let brand_id = brand_param(&query)?;
    let drinks = of_brand(&lock(&shared.drinks), brand_id);
    Ok(Json(PriceRange::spanning(drinks.iter().map(|d| d.price))))
}

async fn list_brands(State(shared): State<Arc<Shared>>) -> Json<Vec<Brand>> {
    shared.record_request("GET /Brands");
    Json(lock(&shared.brands).clone())
}

/// Accepts a JSON array of drinks in the `file` field and replaces the
/// catalog with it.
async fn import_drinks(State(shared): State<Arc<Shared>>, mut multipart: Multipart) -> Response {
    shared.record_request("POST /Drinks/ImportDrinks");

    let mut upload = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    upload = field.bytes().await.ok();
                }
            }
            Ok(None) => break,
            Err(e) => return rejection(StatusCode::BAD_REQUEST, &e.to_string()),
        }
    }

    let Some(bytes) = upload else {
        return rejection(StatusCode::BAD_REQUEST, "no file uploaded");
    };
    match serde_json::from_slice::<Vec<Drink>>(&bytes) {
        Ok(drinks) => {
            let imported = drinks.len();
            *lock(&shared.drinks) = drinks;
            let text_reply = lock(&shared.import_text_reply).clone();
            match text_reply {
                Some(text) => text.into_response(),
                None => Json(json!({"imported": imported})).into_response(),
            }
        }
        Err(e) => rejection(StatusCode::BAD_REQUEST, &format!("unreadable catalog: {e}")),
    }
}

async fn create_order(State(shared): State<Arc<Shared>>, Json(order): Json<OrderRequest>) -> Response {
    shared.record_request("POST /Orders");
    lock(&shared.orders).push(order);

    let outcome = lock(&shared.order_outcome).clone();
    match outcome {
        OrderOutcome::Accept(receipt) => Json(receipt).into_response(),
        OrderOutcome::Reject { status, message } => rejection(status, &message),
    }
}

fn rejection(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"message": message}))).into_response()
}

// =============================================================================
// Hub
// =============================================================================

async fn negotiate(
    State(shared): State<Arc<Shared>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    shared.record_request("POST /negotiate");
    let session = query.get("sessionId").cloned().unwrap_or_default();
    Json(json!({
        "negotiateVersion": 1,
        "connectionId": format!("conn-{session}"),
        "connectionToken": format!("token-{session}"),
        "availableTransports": [
            {"transport": "WebSockets", "transferFormats": ["Text", "Binary"]}
        ]
    }))
}

async fn hub_socket(
    ws: WebSocketUpgrade,
    State(shared): State<Arc<Shared>>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if let Some(session) = query.get("sessionId") {
        lock(&shared.hub_sessions).push(session.clone());
    }
    ws.on_upgrade(move |socket| hub_session(socket, shared))
}

/// One hub connection: handshake, then answer invocations and forward
/// commands from the test until either side goes away.
async fn hub_session(socket: WebSocket, shared: Arc<Shared>) {
    let mut commands = shared.hub_commands.subscribe();
    let (mut sink, mut stream) = socket.split();
    let mut handshaken = false;

    loop {
        let outgoing: Vec<String> = tokio::select! {
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                let mut replies = Vec::new();
                for record in split_records(text.as_str()) {
                    if handshaken {
                        replies.extend(shared.answer(record));
                    } else {
                        handshaken = true;
                        shared.hub_connections.fetch_add(1, Ordering::SeqCst);
                        replies.push(record_of(&json!({})));
                    }
                }
                replies
            }
            command = commands.recv() => match command {
                Ok(HubCommand::Push(target)) => {
                    vec![record_of(&json!({"type": 1, "target": target, "arguments": []}))]
                }
                Ok(HubCommand::Close { allow_reconnect }) => vec![record_of(&json!({
                    "type": 7,
                    "error": "server closing",
                    "allowReconnect": allow_reconnect
                }))],
                Ok(HubCommand::Drop) | Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            },
        };

        for record in outgoing {
            if sink.send(Message::Text(record.into())).await.is_err() {
                return;
            }
        }
    }
}
