// The polling client: four independent loops reconcile the local mirror
// against the server, plus the outbound gateway for the handful of writes.
// Every poll failure is swallowed for that tick; the next tick repairs it.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::{Api, ApiError, BbyBook, ChatMessage};
use crate::bubbles::{Bubble, BubbleStore, BubbleTiming, Rect};
use crate::canvas::{PAINT_HEIGHT, PAINT_WIDTH, PaintBuffer, PixelWrite, RedrawGate};
use crate::colour::{FloatColour, Rgb};
use crate::prefs::Prefs;
use crate::state::BbyState;

pub const STATE_POLL: Duration = Duration::from_millis(500);
pub const CHAT_POLL: Duration = Duration::from_millis(4200);
pub const PAINT_DELTA_POLL: Duration = Duration::from_millis(250);
pub const PAINT_RESYNC: Duration = Duration::from_secs(60);
pub const ACTIVITY_POLL: Duration = Duration::from_secs(7);
pub const EASE_FRAME: Duration = Duration::from_millis(16);
pub const REDRAW_WINDOW: Duration = Duration::from_millis(16);
pub const MOUTH_FLAP: Duration = Duration::from_millis(120);

pub const SAY_ATTEMPTS: u32 = 3;
pub const SAY_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Host-rendering collaborator: find the on-screen rect for a bubble id.
/// The real implementation reads the visualizer's layout table; tests give
/// it whatever geometry they like.
pub type Locate = Arc<dyn Fn(&str) -> Option<Rect> + Send + Sync>;

pub struct BbyClient {
    pub api: Arc<Api>,
    pub mirror: Arc<Mutex<BbyState>>,
    pub paint: Arc<Mutex<Option<PaintBuffer>>>,
    pub bubbles: Arc<Mutex<BubbleStore>>,
    pub target_colour: Arc<Mutex<Rgb>>,
    pub current_colour: Arc<Mutex<FloatColour>>,
    pub prefs: Arc<Mutex<Prefs>>,
    pub facts: Arc<Mutex<BbyBook>>,
    /// Bubble id -> rendered rect, written by the visualizer each frame.
    pub layout: Arc<Mutex<HashMap<String, Rect>>>,
    /// Bumped (coalesced) whenever the paint raster needs repainting.
    pub redraw: Arc<AtomicU64>,
    locate: Mutex<Locate>,
    running: AtomicBool,
}

impl BbyClient {
    pub fn new(api: Api, prefs: Prefs) -> Arc<Self> {
        let layout: Arc<Mutex<HashMap<String, Rect>>> = Arc::new(Mutex::new(HashMap::new()));
        let locate_layout = Arc::clone(&layout);
        let locate: Locate =
            Arc::new(move |id: &str| locate_layout.lock().unwrap().get(id).copied());

        let seed = prefs.user_colour();
        Arc::new(BbyClient {
            api: Arc::new(api),
            mirror: Arc::new(Mutex::new(BbyState::default())),
            paint: Arc::new(Mutex::new(None)),
            bubbles: Arc::new(Mutex::new(BubbleStore::new())),
            target_colour: Arc::new(Mutex::new(seed)),
            current_colour: Arc::new(Mutex::new(FloatColour::from_rgb(seed))),
            prefs: Arc::new(Mutex::new(prefs)),
            facts: Arc::new(Mutex::new(BbyBook::new())),
            layout,
            redraw: Arc::new(AtomicU64::new(0)),
            locate: Mutex::new(locate),
            running: AtomicBool::new(false),
        })
    }

    /// Swap in a different geometry probe (tests, headless runs).
    pub fn set_locate(&self, locate: Locate) {
        *self.locate.lock().unwrap() = locate;
    }

    /// Kick off every poll loop. Idempotent, the second call is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.spawn_state_loop();
        self.spawn_chat_loop();
        self.spawn_easing_loop();
        self.spawn_mouth_loop();
        self.spawn_paint_loops();
        self.spawn_activity_loop();
        self.spawn_fact_fetch();
    }

    // ---- state reconciler -------------------------------------------------

    fn spawn_state_loop(self: &Arc<Self>) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match client.api.get_state().await {
                    Ok(snap) => {
                        client.mirror.lock().unwrap().merge(&snap);
                        if let Some(c) = snap.colour() {
                            *client.target_colour.lock().unwrap() = c;
                        }
                    }
                    Err(e) => log::debug!("state poll skipped: {e}"),
                }
                tokio::time::sleep(STATE_POLL).await;
            }
        });
    }

    // ---- chat consumer ----------------------------------------------------

    fn spawn_chat_loop(self: &Arc<Self>) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match client.api.get_chat_history().await {
                    Ok(history) => {
                        for (id, delay_ms) in client.ingest_chat(&history) {
                            client.schedule_expiry(id, delay_ms);
                        }
                    }
                    Err(e) => log::warn!("chat poll failed: {e}"),
                }
                tokio::time::sleep(CHAT_POLL).await;
            }
        });
    }

    /// Process one chat window: prune the seen set to the server's window,
    /// spawn a bubble per unseen message, and return the removal schedule
    /// for the caller to arm timers with. All-or-nothing per poll.
    pub fn ingest_chat(&self, history: &[ChatMessage]) -> Vec<(String, f64)> {
        let ambient = self.current_colour.lock().unwrap().rounded();
        let mut rng = rand::thread_rng();
        let mut store = self.bubbles.lock().unwrap();

        let window: HashSet<String> = history.iter().map(|m| m.id.clone()).collect();
        store.sync_seen(&window);

        let mut scheduled = Vec::new();
        for message in history {
            if store.knows(&message.id) {
                continue;
            }
            let colour = message.colour.map(|c| c.to_rgb()).unwrap_or(ambient);
            let bubble =
                Bubble::from_message(&message.id, &message.text, &message.author, colour, &mut rng);
            let timing = BubbleTiming::draw(&mut rng, message.text.len());
            if store.spawn(bubble) {
                scheduled.push((message.id.clone(), timing.removal_delay_ms));
            }
        }
        scheduled
    }

    fn schedule_expiry(self: &Arc<Self>, id: String, delay_ms: f64) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
            let locate = Arc::clone(&*client.locate.lock().unwrap());
            let geometry = (*locate)(&id);
            let mut store = client.bubbles.lock().unwrap();
            store.expire(&id, geometry, &mut rand::thread_rng());
        });
    }

    // ---- colour easing + mouth flapper ------------------------------------

    fn spawn_easing_loop(self: &Arc<Self>) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                {
                    let target = *client.target_colour.lock().unwrap();
                    client.current_colour.lock().unwrap().ease_toward(target);
                }
                tokio::time::sleep(EASE_FRAME).await;
            }
        });
    }

    fn spawn_mouth_loop(self: &Arc<Self>) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut was_speaking = false;
            loop {
                {
                    let mut mirror = client.mirror.lock().unwrap();
                    if mirror.is_speaking {
                        mirror.mouth = flap_mouth(&mut rand::thread_rng());
                        was_speaking = true;
                    } else if was_speaking {
                        mirror.mouth = 1;
                        was_speaking = false;
                    }
                }
                tokio::time::sleep(MOUTH_FLAP).await;
            }
        });
    }

    // ---- paint consumer ---------------------------------------------------

    fn spawn_paint_loops(self: &Arc<Self>) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            // bootstrap: no deltas are requested until a snapshot lands
            loop {
                if client.resync_paint().await {
                    break;
                }
                tokio::time::sleep(PAINT_DELTA_POLL).await;
            }

            let resync_client = Arc::clone(&client);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(PAINT_RESYNC).await;
                    resync_client.resync_paint().await;
                }
            });

            let mut gate = RedrawGate::new(REDRAW_WINDOW);
            loop {
                let cursor = {
                    let paint = client.paint.lock().unwrap();
                    match paint.as_ref() {
                        Some(buf) => buf.cursor.clone(),
                        None => None,
                    }
                };
                match client.api.get_paint_events(cursor.as_deref()).await {
                    Ok(events) => {
                        let changed = {
                            let mut paint = client.paint.lock().unwrap();
                            match paint.as_mut() {
                                Some(buf) => buf.apply_batch(&events),
                                None => false,
                            }
                        };
                        if changed && gate.try_signal() {
                            client.redraw.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) => log::debug!("paint delta poll skipped: {e}"),
                }
                tokio::time::sleep(PAINT_DELTA_POLL).await;
            }
        });
    }

    /// Full snapshot replace; self-healing against anything the delta
    /// stream missed. Returns true when a snapshot was materialized.
    async fn resync_paint(&self) -> bool {
        match self.api.get_paint_canvas().await {
            Ok(canvas) => {
                let mut paint = self.paint.lock().unwrap();
                let buf = paint.get_or_insert_with(|| {
                    PaintBuffer::new(canvas.width as usize, canvas.height as usize)
                });
                match buf.replace_from_snapshot(&canvas.rgba_b64) {
                    Ok(()) => {
                        self.redraw.fetch_add(1, Ordering::Relaxed);
                        true
                    }
                    Err(e) => {
                        log::warn!("paint snapshot rejected: {e}");
                        false
                    }
                }
            }
            Err(e) => {
                log::debug!("paint snapshot poll skipped: {e}");
                false
            }
        }
    }

    // ---- activity / autosnap ----------------------------------------------

    fn spawn_activity_loop(self: &Arc<Self>) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut last_snap: Option<String> = None;
            loop {
                if let Ok(activity) = client.api.get_activity().await {
                    if let Some(snap_id) = activity.snap_id {
                        if last_snap.as_deref() != Some(snap_id.as_str()) {
                            client.attach_autosnap(&snap_id).await;
                            last_snap = Some(snap_id);
                        }
                    }
                }
                tokio::time::sleep(ACTIVITY_POLL).await;
            }
        });
    }

    /// Best effort: attach the current raster to a fresh snapshot pointer.
    async fn attach_autosnap(&self, snap_id: &str) {
        let png = {
            let paint = self.paint.lock().unwrap();
            match paint.as_ref().map(|buf| buf.to_png()) {
                Some(Ok(png)) => png,
                Some(Err(e)) => {
                    log::warn!("autosnap encode failed: {e}");
                    return;
                }
                None => return,
            }
        };
        let b64 = STANDARD.encode(&png);
        if let Err(e) = self.api.post_attach_png(snap_id, &b64).await {
            log::warn!("autosnap attach failed: {e}");
        }
    }

    fn spawn_fact_fetch(self: &Arc<Self>) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            match client.api.get_bbybook().await {
                Ok(book) => {
                    log::info!("loaded {} bbyfacts", book.len());
                    *client.facts.lock().unwrap() = book;
                }
                Err(e) => log::warn!("bbybook fetch failed: {e}"),
            }
        });
    }

    // ---- outbound gateway -------------------------------------------------

    /// The one write whose delivery matters. Trims, refuses empty text,
    /// optimistically shifts the ambient target, then posts with a small
    /// retry budget and linear backoff.
    pub async fn say(&self, text: &str) -> Result<(), ApiError> {
        let trimmed = text.trim().to_string();
        if trimmed.is_empty() {
            return Ok(());
        }
        let (author, colour) = {
            let prefs = self.prefs.lock().unwrap();
            (prefs.username.clone(), prefs.user_colour())
        };
        *self.target_colour.lock().unwrap() = colour;

        let api = Arc::clone(&self.api);
        let result = with_retry(SAY_ATTEMPTS, SAY_BACKOFF_UNIT, || {
            let api = Arc::clone(&api);
            let trimmed = trimmed.clone();
            let author = author.clone();
            async move { api.post_say(&trimmed, &author, colour).await }
        })
        .await;

        if let Err(e) = &result {
            log::error!("failed to talk to baby: {e}");
        }
        result
    }

    pub async fn say_random_fact(&self) -> Result<(), ApiError> {
        let message = {
            let facts = self.facts.lock().unwrap();
            let mut rng = rand::thread_rng();
            match facts.iter().nth(rng.gen_range(0..facts.len().max(1))) {
                Some((key, fact)) if !fact.value.is_empty() => {
                    format!("hey bby, did you know that {} is {}?", key, fact.value)
                }
                _ => "I don't know any facts yet...".to_string(),
            }
        };
        self.say(&message).await
    }

    /// Fire-and-forget scalar-state patch; loss self-corrects on the next
    /// state poll.
    pub async fn request_state_change(&self, updates: serde_json::Value) {
        if let Err(e) = self.api.post_state_change(&updates).await {
            log::warn!("state change dropped: {e}");
        }
    }

    /// Fire-and-forget pixel write in the user's colour.
    pub async fn paint_pixel(&self, x: u32, y: u32) {
        if x as usize >= PAINT_WIDTH || y as usize >= PAINT_HEIGHT {
            log::warn!("paint_pixel ({x}, {y}) outside the canvas");
            return;
        }
        let c = self.prefs.lock().unwrap().user_colour();
        let write = PixelWrite { x, y, r: c.r, g: c.g, b: c.b, a: 255 };
        if let Err(e) = self.api.post_pixels(&[write]).await {
            log::warn!("pixel write dropped: {e}");
        }
    }

    /// Single-attempt composite upload; the caller may surface the error.
    pub async fn save_snapshot(&self, label: &str) -> Result<(), ApiError> {
        let png = self.encode_paint_png()?;
        self.api.post_snapshot(label, &STANDARD.encode(&png)).await
    }

    pub async fn save_to_gallery(&self, label: &str) -> Result<(), ApiError> {
        let png = self.encode_paint_png()?;
        let author = self.prefs.lock().unwrap().username.clone();
        self.api.post_save_to_gallery(png, &author, label).await
    }

    fn encode_paint_png(&self) -> Result<Vec<u8>, ApiError> {
        let paint = self.paint.lock().unwrap();
        let buf = paint.as_ref().ok_or_else(|| ApiError::Server {
            endpoint: "/snapshot".to_string(),
            message: "paint buffer not bootstrapped yet".to_string(),
        })?;
        buf.to_png().map_err(|e| ApiError::Server {
            endpoint: "/snapshot".to_string(),
            message: format!("png encode failed: {e}"),
        })
    }

    pub fn set_username(&self, name: &str, prefs_path: &str) {
        let mut prefs = self.prefs.lock().unwrap();
        prefs.username = name.to_string();
        if let Err(e) = prefs.save(prefs_path) {
            log::warn!("prefs save failed: {e}");
        }
    }

    pub fn set_user_colour(&self, colour: Rgb, prefs_path: &str) {
        let mut prefs = self.prefs.lock().unwrap();
        prefs.set_colour(colour);
        if let Err(e) = prefs.save(prefs_path) {
            log::warn!("prefs save failed: {e}");
        }
    }

    pub fn clear_bubbles(&self) {
        self.bubbles.lock().unwrap().clear();
    }
}

/// Speaking mouth shapes are 75..=85, picked fresh every flap.
pub fn flap_mouth(rng: &mut impl Rng) -> i32 {
    75 + rng.gen_range(0..11)
}

/// Run op up to `attempts` times, sleeping `unit * attempt` between
/// failures so the backoff grows linearly. The last error wins.
pub async fn with_retry<T, F, Fut>(attempts: u32, unit: Duration, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut last_err = None;
    for attempt in 1..=attempts {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(unit * attempt).await;
                }
            }
        }
    }
    Err(last_err.expect("with_retry called with zero attempts"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MessageColour;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    fn offline_client() -> Arc<BbyClient> {
        // closed port: any real call would fail fast
        BbyClient::new(Api::with_base("http://127.0.0.1:9/api"), Prefs::default())
    }

    fn msg(id: &str, text: &str) -> ChatMessage {
        serde_json::from_value(serde_json::json!({
            "id": id, "author": "kevin", "text": text
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn retry_succeeds_on_third_attempt_with_growing_backoff() {
        let calls = AtomicU32::new(0);
        let mut stamps: Vec<Instant> = Vec::new();
        let stamps_ref = &mut stamps;
        let result = with_retry(3, Duration::from_millis(20), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            stamps_ref.push(Instant::now());
            async move {
                if n < 3 {
                    Err(ApiError::Server {
                        endpoint: "/say".to_string(),
                        message: "boom".to_string(),
                    })
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let gap1 = stamps[1] - stamps[0];
        let gap2 = stamps[2] - stamps[1];
        assert!(gap1 >= Duration::from_millis(20));
        assert!(gap2 >= Duration::from_millis(40));
        assert!(gap2 > gap1);
    }

    #[tokio::test]
    async fn retry_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ApiError::Server {
                    endpoint: "/say".to_string(),
                    message: "always down".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_say_is_a_local_no_op() {
        let client = offline_client();
        let started = Instant::now();
        assert!(client.say("   ").await.is_ok());
        // no network call, no retries, so this returns immediately
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(client.bubbles.lock().unwrap().bubbles.is_empty());
    }

    #[tokio::test]
    async fn say_optimistically_shifts_target_colour() {
        let client = offline_client();
        client.set_user_colour(Rgb::new(9, 9, 9), "/dev/null");
        let _ = client.say("hello").await; // network fails, colour stays
        assert_eq!(*client.target_colour.lock().unwrap(), Rgb::new(9, 9, 9));
    }

    #[test]
    fn ingest_spawns_once_per_id_across_polls() {
        let client = offline_client();
        let history = vec![msg("m1", "hello"), msg("m2", "world")];

        let first = client.ingest_chat(&history);
        assert_eq!(first.len(), 2);

        // second poll with the same window before any expiry
        let second = client.ingest_chat(&history);
        assert!(second.is_empty());
        assert_eq!(client.bubbles.lock().unwrap().bubbles.len(), 2);
    }

    #[test]
    fn ingest_stamps_message_colour_or_ambient_fallback() {
        let client = offline_client();
        let mut coloured = msg("m1", "hi");
        coloured.colour = Some(MessageColour { r: 10, g: 20, b: 30 });
        client.ingest_chat(&[coloured, msg("m2", "hi")]);

        let store = client.bubbles.lock().unwrap();
        let m1 = store.bubbles.iter().find(|b| b.id == "m1").unwrap();
        let m2 = store.bubbles.iter().find(|b| b.id == "m2").unwrap();
        assert_eq!(m1.bg, Rgb::new(10, 20, 30));
        let ambient = client.current_colour.lock().unwrap().rounded();
        assert_eq!(m2.bg, ambient);
    }

    #[test]
    fn ingest_prunes_seen_to_server_window() {
        let client = offline_client();
        client.ingest_chat(&[msg("m1", "hi")]);
        // m1 fell out of the window; a different id arrives
        client.ingest_chat(&[msg("m2", "yo")]);
        let store = client.bubbles.lock().unwrap();
        assert!(!store.seen.contains("m1"));
        // active bubble m1 still blocks a respawn regardless
        drop(store);
        let respawn = client.ingest_chat(&[msg("m1", "hi"), msg("m2", "yo")]);
        assert!(respawn.is_empty());
    }

    #[tokio::test]
    async fn expiry_timer_captures_ghost_through_locate() {
        let client = offline_client();
        client.set_locate(Arc::new(|_: &str| Some(Rect { x: 1.0, y: 2.0, w: 3.0, h: 4.0 })));
        client.ingest_chat(&[msg("m1", "hi")]);
        client.schedule_expiry("m1".to_string(), 5.0);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let store = client.bubbles.lock().unwrap();
        assert!(store.bubbles.is_empty());
        assert_eq!(store.ghosts.len(), 1);
        assert_eq!(store.ghosts[0].id, "ghost-m1");
    }

    #[test]
    fn mouth_flap_stays_in_speaking_band() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let m = flap_mouth(&mut rng);
            assert!((75..=85).contains(&m));
        }
    }

    #[test]
    fn start_is_idempotent() {
        // running flag flips exactly once; a second start changes nothing
        let client = offline_client();
        assert!(!client.running.swap(true, Ordering::SeqCst));
        assert!(client.running.swap(true, Ordering::SeqCst));
    }
}
