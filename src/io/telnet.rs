// BBS Node - Telnet Codec
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Just enough telnet for a character-mode terminal session

use std::borrow::Cow;

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

pub const OPT_ECHO: u8 = 1;
pub const OPT_SGA: u8 = 3;

/// Server echoes and suppresses go-ahead: character mode
pub const NEGOTIATION: [u8; 9] = [IAC, WILL, OPT_ECHO, IAC, WILL, OPT_SGA, IAC, DO, OPT_SGA];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DecodeState {
    #[default]
    Data,
    Iac,
    Option,
    Sub,
    SubIac,
}

/// Strips telnet commands from the inbound stream, across read boundaries
#[derive(Debug, Default)]
pub struct TelnetDecoder {
    state: DecodeState,
    after_cr: bool,
}

impl TelnetDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &byte in input {
            self.state = match self.state {
                DecodeState::Data => match byte {
                    IAC => DecodeState::Iac,
                    // CR NUL is a bare carriage return
                    0 if self.after_cr => {
                        self.after_cr = false;
                        DecodeState::Data
                    }
                    _ => {
                        self.after_cr = byte == b'\r';
                        out.push(byte);
                        DecodeState::Data
                    }
                },
                DecodeState::Iac => match byte {
                    IAC => {
                        self.after_cr = false;
                        out.push(IAC);
                        DecodeState::Data
                    }
                    WILL | WONT | DO | DONT => DecodeState::Option,
                    SB => DecodeState::Sub,
                    _ => DecodeState::Data,
                },
                DecodeState::Option => DecodeState::Data,
                DecodeState::Sub => match byte {
                    IAC => DecodeState::SubIac,
                    _ => DecodeState::Sub,
                },
                DecodeState::SubIac => match byte {
                    SE => DecodeState::Data,
                    _ => DecodeState::Sub,
                },
            };
        }
    }
}

/// Double every IAC so data bytes are not taken for commands
pub fn escape(data: &[u8]) -> Cow<'_, [u8]> {
    if !data.contains(&IAC) {
        return Cow::Borrowed(data);
    }
    let mut escaped = Vec::with_capacity(data.len() + 8);
    for &byte in data {
        escaped.push(byte);
        if byte == IAC {
            escaped.push(IAC);
        }
    }
    Cow::Owned(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<u8> {
        let mut decoder = TelnetDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            decoder.decode(chunk, &mut out);
        }
        out
    }

    #[test]
    fn test_strips_negotiation_and_subnegotiation() {
        let input = [
            b'h', IAC, DO, OPT_ECHO, b'i', IAC, SB, 24, 0, b'x', b't', b'e', b'r', b'm', IAC, SE, b'!',
        ];
        assert_eq!(decode_all(&[&input[..]]), b"hi!");
    }

    #[test]
    fn test_commands_split_across_reads() {
        let chunks: [&[u8]; 3] = [&[b'a', IAC], &[WILL], &[OPT_SGA, b'b']];
        assert_eq!(decode_all(&chunks), b"ab");
        let chunks: [&[u8]; 2] = [&[IAC], &[IAC]];
        assert_eq!(decode_all(&chunks), vec![IAC]);
    }

    #[test]
    fn test_cr_nul_becomes_cr() {
        let chunks: [&[u8]; 3] = [b"ok\r", &[0], b"\n"];
        assert_eq!(decode_all(&chunks), b"ok\r\n");
        let chunks: [&[u8]; 1] = [&[0, b'a']];
        assert_eq!(decode_all(&chunks), vec![0, b'a']);
    }

    #[test]
    fn test_escape_doubles_iac() {
        assert!(matches!(escape(b"plain"), Cow::Borrowed(_)));
        assert_eq!(escape(&[1, IAC, 2]).as_ref(), &[1, IAC, IAC, 2]);
    }
}
