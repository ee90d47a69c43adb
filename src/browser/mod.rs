pub mod pool;
pub mod user_agents;
pub mod window;

pub use pool::WindowPool;
pub use window::BrowserWindow;
