//! Frames and the sources that deliver them.

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::Receiver;

/// 8-bit grayscale image, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Image {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// All-black image of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(width, height, vec![0; width as usize * height as usize])
    }
}

/// One timestamped camera image.
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp_ns: u64,
    pub image: Arc<Image>,
}

impl Frame {
    pub fn new(timestamp_ns: u64, image: Arc<Image>) -> Self {
        Self {
            timestamp_ns,
            image,
        }
    }
}

/// Pull-based supply of frames, in timestamp order.
///
/// `None` means the stream has ended.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<Frame>;
}

/// Blocks until a frame arrives; ends when every sender is dropped.
impl FrameSource for Receiver<Frame> {
    fn next_frame(&mut self) -> Option<Frame> {
        self.recv().ok()
    }
}

impl FrameSource for VecDeque<Frame> {
    fn next_frame(&mut self) -> Option<Frame> {
        self.pop_front()
    }
}
