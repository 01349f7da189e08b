pub mod api;
pub mod bubbles;
pub mod canvas;
pub mod client;
pub mod colour;
pub mod prefs;
pub mod state;
pub mod visualizer;

pub use api::{Api, ApiError, ChatMessage};
pub use bubbles::{Bubble, BubbleStore, Ghost, MAX_GHOSTS, Rect};
pub use canvas::{PAINT_HEIGHT, PAINT_WIDTH, PaintBuffer, PaintEvent, PixelWrite, RedrawGate};
pub use client::{BbyClient, with_retry};
pub use colour::{
    EqType, FloatColour, Rgb, StepContext, compute_next_colours, hex_to_rgb, step_colour_once,
};
pub use prefs::Prefs;
pub use state::{BbyState, StateSnapshot};
pub use visualizer::spawn_visualizer;
