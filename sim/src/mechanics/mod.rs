mod driving;
mod intersection;
mod request;
mod reservation;
mod tile;
mod tiling;

pub use self::driving::DrivingState;
pub use self::intersection::IntersectionManager;
pub use self::request::RequestSim;
pub use self::reservation::{Reservation, ScheduledExit, TileSet};
pub use self::tile::{Tile, TileIndex, TileLayer};
pub use self::tiling::Tiling;
