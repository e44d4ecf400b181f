pub mod backend;
pub mod bus;
pub mod controller;
pub mod gateway;
pub mod monitor;
pub mod mpd;
pub mod resolver;
pub mod rules;
pub mod sleep;
pub mod sonos;
