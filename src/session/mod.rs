pub mod commands;
pub mod controller;
pub mod display_names;
pub mod events;
pub mod render;
pub mod runner;
pub mod state;

pub use controller::{SessionController, SessionOptions};
pub use display_names::{DisplayNameMap, TagRelabel};
pub use events::{ImageNavigation, ListKind, Persist, SessionCommand, SessionEvent, StylingChange};
pub use render::{ImageView, Renderer, ScalarPlot};
pub use runner::{run_session, SessionExit};
pub use state::{Color, LayoutState, PlotMode, PlotStyling, SelectionState};
