//! Notification dispatch for DingTalk robots.
//!
//! Two channels share one message model:
//!
//! - **custom robot**: a group webhook, optionally HMAC-signed per request
//! - **enterprise robot**: one-to-one batch sends through the OpenAPI, gated by
//!   an OAuth2 token, with mobile numbers resolved to user ids and file media
//!   uploaded first
//!
//! [`Orchestrator::run`] sends items strictly in order and returns the ordered
//! output batch.

pub mod api;
pub mod auth;
pub mod custom;
pub mod dispatcher;
pub mod enterprise;
pub mod error;
pub mod media;
pub mod message;
pub mod orchestrator;
pub mod payload;
pub mod sign;
pub mod users;

pub use {
    auth::{AccessToken, TokenManager},
    custom::CustomRobotDispatcher,
    dispatcher::{ChannelDispatcher, ChannelKind, DispatchItem, DispatchOutput},
    enterprise::EnterpriseRobotDispatcher,
    error::{Error, ErrorDetail, ErrorKind, Result},
    media::{Attachment, MediaUploader},
    message::{Action, Actions, FeedLink, Mentions, Message, MessageInput, Orientation},
    orchestrator::{DispatchReport, Orchestrator, RunOptions},
    users::{Resolution, ResolvedUser, UserResolver},
};
