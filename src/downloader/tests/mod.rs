use super::*;
use crate::downloader::test_helpers::{
    create_test_downloader, drain_events, saved_queue, test_config,
};
use crate::types::QueueItem;

mod config_ops;
