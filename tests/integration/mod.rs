mod cache_pipeline;
mod playback_feed;
