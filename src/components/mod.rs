/*
 * Kernel Components
 *
 * Higher-level building blocks assembled from the driver and utility
 * layers below them (currently just the TTY abstraction).
 */

pub mod tty;
