use std::collections::VecDeque;

use crate::error::{TrackError, TrackResult};
use crate::{Descriptors, GrayImage, Keypoint, Match};

/// One image with its features and the matches from the previous frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position of the image in the input sequence
    pub index: usize,
    pub image: GrayImage,
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Option<Descriptors>,
    /// previous frame's keypoints (query) -> this frame's keypoints (train)
    pub matches: Vec<Match>,
}

impl Frame {
    pub fn new(index: usize, image: GrayImage) -> Self {
        Self {
            index,
            image,
            keypoints: Vec::new(),
            descriptors: None,
            matches: Vec::new(),
        }
    }

    pub fn descriptors(&self) -> TrackResult<&Descriptors> {
        self.descriptors
            .as_ref()
            .ok_or(TrackError::UndescribedFrame { index: self.index })
    }
}

/// Fixed-capacity FIFO window over the most recent frames
#[derive(Debug)]
pub struct FrameBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> TrackResult<Self> {
        if capacity == 0 {
            return Err(TrackError::Configuration(
                "frame buffer capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Append a frame, evicting and returning the oldest one when full
    pub fn push(&mut self, frame: Frame) -> Option<Frame> {
        let evicted = if self.frames.len() == self.capacity {
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        evicted
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed frame
    pub fn current(&self) -> TrackResult<&Frame> {
        self.frames.back().ok_or(TrackError::EmptyBuffer)
    }

    pub fn current_mut(&mut self) -> TrackResult<&mut Frame> {
        self.frames.back_mut().ok_or(TrackError::EmptyBuffer)
    }

    /// Second most recently pushed frame
    pub fn previous(&self) -> TrackResult<&Frame> {
        let n = self.frames.len();
        if n < 2 {
            return Err(TrackError::InsufficientFrames { available: n });
        }
        Ok(&self.frames[n - 2])
    }

    /// (previous, current) with the current frame writable
    pub fn latest_pair_mut(&mut self) -> TrackResult<(&Frame, &mut Frame)> {
        let n = self.frames.len();
        if n < 2 {
            return Err(TrackError::InsufficientFrames { available: n });
        }
        let mut tail = self.frames.range_mut(n - 2..);
        match (tail.next(), tail.next()) {
            (Some(previous), Some(current)) => Ok((&*previous, current)),
            _ => Err(TrackError::InsufficientFrames { available: n }),
        }
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }
}
