// BBS Node - Local Console
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use crate::log_debug;
use crate::wfc::{Console, WfcScreen};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Sysop console on the process's own terminal
pub struct StdinConsole {
    keys: Receiver<u8>,
    buffered: VecDeque<u8>,
    last_screen: Option<WfcScreen>,
    closed: bool,
}

impl StdinConsole {
    pub fn new() -> Self {
        let (tx, keys) = mpsc::channel();
        // Blocking stdin reads stay off the runtime
        thread::spawn(move || {
            let stdin = io::stdin();
            for byte in stdin.lock().bytes() {
                let Ok(byte) = byte else { break };
                if tx.send(byte).is_err() {
                    break;
                }
            }
        });
        Self {
            keys,
            buffered: VecDeque::new(),
            last_screen: None,
            closed: false,
        }
    }

    fn poll(&mut self) {
        if self.closed {
            return;
        }
        loop {
            match self.keys.try_recv() {
                // Line-buffered terminals deliver the Enter as well
                Ok(b'\n') => {}
                Ok(byte) => self.buffered.push_back(byte),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    log_debug!("Console input closed");
                    self.closed = true;
                    return;
                }
            }
        }
    }

    fn write(&self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

impl Default for StdinConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdinConsole {
    fn key_pressed(&mut self) -> bool {
        self.poll();
        !self.buffered.is_empty()
    }

    fn get_key(&mut self) -> Option<u8> {
        self.poll();
        self.buffered.pop_front()
    }

    fn cls(&mut self) {
        self.write(CLEAR_SCREEN);
        self.last_screen = None;
    }

    fn puts(&mut self, text: &str) {
        self.write(text);
        // Anything printed covers the WFC screen
        self.last_screen = None;
    }

    fn draw_wfc(&mut self, screen: &WfcScreen) {
        if self.last_screen.as_ref() == Some(screen) {
            return;
        }
        let mut text = String::from(CLEAR_SCREEN);
        for line in screen.lines() {
            text.push_str(&line);
            text.push_str("\r\n");
        }
        self.write(&text);
        self.last_screen = Some(screen.clone());
    }
}

/// Console for nodes without a local terminal
#[derive(Debug, Default)]
pub struct NullConsole;

impl Console for NullConsole {
    fn key_pressed(&mut self) -> bool {
        false
    }

    fn get_key(&mut self) -> Option<u8> {
        None
    }

    fn cls(&mut self) {}

    fn puts(&mut self, text: &str) {
        log_debug!("console: {}", text.trim_end());
    }

    fn draw_wfc(&mut self, _screen: &WfcScreen) {}
}
