//! Backend with no window: events come from a script, frames are kept for
//! inspection.

use std::collections::VecDeque;

use crate::error::Result;
use crate::input::InputEvent;
use crate::render::DrawList;
use crate::services::Services;

use super::Backend;

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    script: VecDeque<Vec<InputEvent>>,
    size: (u32, u32),
    frames_presented: u64,
    last_frame: Option<DrawList>,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            ..Default::default()
        }
    }

    /// Queue the events delivered on the next unscripted frame. Each call
    /// scripts one frame.
    pub fn push_frame(&mut self, events: impl IntoIterator<Item = InputEvent>) {
        self.script.push_back(events.into_iter().collect());
    }

    pub fn with_frame(mut self, events: impl IntoIterator<Item = InputEvent>) -> Self {
        self.push_frame(events);
        self
    }

    /// Frames still waiting in the script.
    pub fn scripted_frames(&self) -> usize {
        self.script.len()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// The most recently presented frame.
    pub fn last_frame(&self) -> Option<&DrawList> {
        self.last_frame.as_ref()
    }
}

impl Backend for HeadlessBackend {
    fn poll_events(&mut self) -> Result<Vec<InputEvent>> {
        let events = self.script.pop_front().unwrap_or_default();
        for event in &events {
            if let InputEvent::Resized { width, height } = *event {
                self.size = (width, height);
            }
        }
        Ok(events)
    }

    fn present(&mut self, frame: &DrawList, _services: &Services) -> Result<()> {
        self.frames_presented += 1;
        match &mut self.last_frame {
            Some(last) => last.clone_from(frame),
            None => self.last_frame = Some(frame.clone()),
        }
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }
}
