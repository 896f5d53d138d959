pub mod adapter;
pub mod audit;
pub mod demo;
pub mod describe;
pub mod doom_loop;
pub mod error;
pub mod model;
pub mod paths;
pub mod planner;
pub mod project;
pub mod proposal;
pub mod reference;
pub mod registry;
pub mod runner;
pub mod settings;
