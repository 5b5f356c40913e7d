//! 浏览器接入
//!
//! 两种方式拿到 Page：启动无头浏览器，或连接已开启调试端口的浏览器。

pub mod connection;
pub mod headless;

pub use connection::connect_to_browser_and_page;
pub use headless::launch_headless_browser;
