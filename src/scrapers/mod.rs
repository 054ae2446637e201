pub mod browser;
pub mod naver;
pub mod rooms;
pub mod schedule;
pub mod traits;
pub mod types;

pub use browser::{BrowserLogin, Credentials, SessionToken};
pub use naver::NaverSite;
pub use rooms::RoomSearchSite;
pub use schedule::ScheduleSite;
pub use traits::{Site, SiteResponse};
