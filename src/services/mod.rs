// Services module - Business logic

pub mod allocator;
pub mod card_registry;
pub mod renderer;
