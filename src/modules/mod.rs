pub mod expression_handler;
pub mod sign_classifier;
pub mod speech_narrator;
