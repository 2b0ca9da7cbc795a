pub mod client;
pub mod gateway;
pub mod normalize;
pub mod prompts;

pub use client::{ContentPart, GeminiClient, GenerativeModel};
pub use gateway::{AiGateway, GatewayError, GatewayResult, ModelNames, RequestTicket, RequestTracker};
