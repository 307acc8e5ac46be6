pub mod activity;
pub mod aggregate;
pub mod canvas;
pub mod cursor;
pub mod geo;
pub mod mapper;
pub mod selection;
pub mod world_grid;
