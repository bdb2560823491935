mod client;

pub use client::{
    ApiErrorClass, PinboardClient, PinboardError, Post, PostInput, ResultCode, TagCount,
    TagSuggestions, format_timestamp, parse_timestamp,
};
