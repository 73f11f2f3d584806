//! Built-in decoder plugins backed by Symphonia.
//!
//! Registration order matters for selection: earlier plugins win when several claim
//! the same MIME type or suffix.

mod decode;

use crate::input::{InputStream, peek_head};
use crate::plugin::{DecoderPlugin, StreamKinds};

/// Bytes read by probes; enough for an Ogg page header with a full segment table.
const PROBE_LEN: usize = 512;

pub fn builtin_plugins() -> Vec<DecoderPlugin> {
    let any = StreamKinds::URL | StreamKinds::FILE;
    vec![
        DecoderPlugin::new("flac", any)
            .with_suffixes(&["flac"])
            .with_mime_types(&["audio/flac", "audio/x-flac"])
            .with_probe(|input| probe_with(input, is_flac))
            .with_stream_decode(|decoder, input| decode::decode_stream(decoder, input, "flac"))
            .with_file_decode(decode::decode_file),
        DecoderPlugin::new("mp3", any)
            .with_suffixes(&["mp3"])
            .with_mime_types(&["audio/mpeg", "audio/mp3"])
            .with_stream_decode(|decoder, input| decode::decode_stream(decoder, input, "mp3")),
        DecoderPlugin::new("oggvorbis", any)
            .with_suffixes(&["ogg", "oga"])
            .with_mime_types(&[
                "application/ogg",
                "audio/ogg",
                "audio/x-vorbis+ogg",
                "application/x-ogg",
            ])
            .with_probe(|input| probe_with(input, is_ogg_vorbis))
            .with_stream_decode(|decoder, input| decode::decode_stream(decoder, input, "ogg")),
        DecoderPlugin::new("wav", any)
            .with_suffixes(&["wav"])
            .with_mime_types(&["audio/wav", "audio/x-wav", "audio/wave"])
            .with_probe(|input| probe_with(input, is_wav))
            .with_stream_decode(|decoder, input| decode::decode_stream(decoder, input, "wav"))
            .with_file_decode(decode::decode_file),
        DecoderPlugin::new("aiff", StreamKinds::FILE)
            .with_suffixes(&["aif", "aiff"])
            .with_mime_types(&["audio/aiff", "audio/x-aiff"])
            .with_probe(|input| probe_with(input, is_aiff))
            .with_file_decode(decode::decode_file),
        DecoderPlugin::new("aac", any)
            .with_suffixes(&["aac"])
            .with_mime_types(&["audio/aac", "audio/aacp"])
            .with_stream_decode(|decoder, input| decode::decode_stream(decoder, input, "aac")),
    ]
}

/// Run a magic-byte check on the head of a seekable stream.
///
/// Non-seekable streams are accepted since they cannot be rewound after peeking.
fn probe_with(input: &mut dyn InputStream, check: fn(&[u8]) -> bool) -> bool {
    if !input.is_seekable() {
        return true;
    }
    let mut head = [0u8; PROBE_LEN];
    match peek_head(input, &mut head) {
        Ok(n) => check(&head[..n]),
        Err(err) => {
            tracing::debug!(error = %err, "probe read failed");
            false
        }
    }
}

fn is_flac(head: &[u8]) -> bool {
    head.starts_with(b"fLaC") || head.starts_with(b"ID3")
}

fn is_wav(head: &[u8]) -> bool {
    head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WAVE"
}

fn is_aiff(head: &[u8]) -> bool {
    head.len() >= 12 && &head[..4] == b"FORM" && matches!(&head[8..12], b"AIFF" | b"AIFC")
}

/// First Ogg page carrying a Vorbis identification header.
fn is_ogg_vorbis(head: &[u8]) -> bool {
    if head.len() < 27 || !head.starts_with(b"OggS") {
        return false;
    }
    let start = 27 + head[26] as usize;
    head.get(start..start + 7)
        .is_some_and(|packet| packet == b"\x01vorbis")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemInput;

    fn ogg_page(packet: &[u8]) -> Vec<u8> {
        let mut page = b"OggS".to_vec();
        page.extend_from_slice(&[0u8; 22]);
        page.push(1);
        page.push(packet.len() as u8);
        page.extend_from_slice(packet);
        page
    }

    #[test]
    fn builtin_order_and_names() {
        let names: Vec<_> = builtin_plugins().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["flac", "mp3", "oggvorbis", "wav", "aiff", "aac"]);
    }

    #[test]
    fn builtin_entry_points() {
        let plugins = builtin_plugins();
        let flac = &plugins[0];
        assert!(flac.has_file_decode() && flac.has_stream_decode());
        let mp3 = &plugins[1];
        assert!(!mp3.has_probe());
        assert!(!mp3.has_file_decode());
        let aiff = &plugins[4];
        assert!(!aiff.stream_kinds().contains(StreamKinds::URL));
        assert!(!aiff.has_stream_decode());
    }

    #[test]
    fn magic_checks() {
        assert!(is_flac(b"fLaC\0\0\0\x22"));
        assert!(!is_flac(b"OggS"));
        assert!(is_wav(b"RIFF\x24\0\0\0WAVEfmt "));
        assert!(!is_wav(b"RIFF\x24\0\0\0AVI "));
        assert!(is_aiff(b"FORM\0\0\0\0AIFC"));
        assert!(!is_aiff(b"FORM"));
    }

    #[test]
    fn ogg_vorbis_requires_vorbis_id_header() {
        assert!(is_ogg_vorbis(&ogg_page(b"\x01vorbis\0\0\0\0")));
        assert!(!is_ogg_vorbis(&ogg_page(b"OpusHead")));
        assert!(!is_ogg_vorbis(b"OggS"));
    }

    #[test]
    fn probe_rewinds_and_checks_head() {
        let plugins = builtin_plugins();
        let wav = &plugins[3];
        let mut input = MemInput::new(b"RIFF\x24\0\0\0WAVEfmt ".to_vec());
        assert!(wav.accepts(&mut input));
        assert_eq!(input.offset(), 0);

        let mut not_wav = MemInput::new(b"fLaC\0\0\0\x22".to_vec());
        assert!(!wav.accepts(&mut not_wav));
    }

    #[test]
    fn probe_accepts_unseekable_streams() {
        let plugins = builtin_plugins();
        let flac = &plugins[0];
        let mut input = MemInput::new(b"garbage".to_vec()).unseekable();
        assert!(flac.accepts(&mut input));
    }
}
