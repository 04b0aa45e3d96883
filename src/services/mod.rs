pub mod competition_service;
pub mod health_service;
pub mod leader_feed;
pub mod podium;
pub mod score_sync;
pub mod sse_events;
pub mod sse_service;
