//! Stream selection

use crate::types::{Stream, StreamSet};

/// Pick the stream to decode from `streams`
///
/// Audio-capable streams only; the default-audio subset wins when non-empty.
/// Within the subset the first non-empty class of audio-only Opus, other
/// audio-only, then audio with video is used, and its highest bitrate stream
/// is chosen (first wins on ties). The set's normalization volume is copied
/// onto the result.
#[must_use]
pub fn get_best_stream(streams: &StreamSet) -> Option<Stream> {
    let audio: Vec<&Stream> = streams.streams().iter().filter(|s| s.audio).collect();

    let defaults: Vec<&Stream> = audio.iter().copied().filter(|s| s.default_audio).collect();
    let candidates = if defaults.is_empty() { audio } else { defaults };

    let (opus, rest): (Vec<&Stream>, Vec<&Stream>) = candidates
        .into_iter()
        .partition(|s| !s.video && s.is_opus());
    let (other_audio, video): (Vec<&Stream>, Vec<&Stream>) =
        rest.into_iter().partition(|s| !s.video);

    let class = [opus, other_audio, video]
        .into_iter()
        .find(|class| !class.is_empty())?;

    let best = class
        .into_iter()
        .reduce(|best, cur| if cur.bitrate > best.bitrate { cur } else { best })?;

    let mut chosen = best.clone();
    chosen.volume = streams.volume;

    tracing::debug!(
        bitrate = chosen.bitrate,
        codecs = chosen.codecs.as_deref().unwrap_or("unknown"),
        video = chosen.video,
        "Selected stream"
    );
    Some(chosen)
}
