pub mod app;
pub mod error;
pub mod renderer;
pub mod scene;
pub mod settings;

use app::App;
use winit::event_loop::EventLoop;

pub use error::{PeelError, PeelResult};

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

pub fn run(mut app: App) -> Result<(), winit::error::EventLoopError> {
    init_logging();

    log::info!("Starting depth peeling demo (P: peeling, +/-: layers, D: double sided)");

    let event_loop = EventLoop::new()?;
    let result = event_loop.run_app(&mut app);

    if let Err(ref err) = result {
        log::error!("Application error: {}", err);
    }

    log::info!("Application shutdown complete");

    result
}
