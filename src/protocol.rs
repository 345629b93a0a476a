//! Telemetry record and its JSON socket framing.
//!
//! A frame on the wire is the JSON body length in ASCII decimal, a `\n`,
//! then the JSON body:
//!
//! ```text
//! 73\n{"videoSize":[640,480],"bot1":[12.5,320.0,240.0],"ball":[1000.0,0.0,0.0]}
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::error::TransportError;
use crate::geometry::{MarkerPose, Point2};
use crate::vision::{BlobCandidate, BlobSelection};

/// 受信側が受け付ける最大フレーム長
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

// 10 digits for the length plus the newline
const MAX_HEADER_LENGTH: usize = 11;

// --- Record ---

/// One telemetry sample pushed to the consumer every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireRecord", from = "WireRecord")]
pub struct TelemetryRecord {
    /// Capture resolution, fixed when the server starts.
    pub video_size: (u32, u32),
    pub marker_pose: MarkerPose,
    pub blob_selection: BlobSelection,
}

impl TelemetryRecord {
    pub fn new(video_size: (u32, u32), marker_pose: MarkerPose, blob_selection: BlobSelection) -> Self {
        Self {
            video_size,
            marker_pose,
            blob_selection,
        }
    }

    /// Sentinels for both marker and blob.
    pub fn empty(video_size: (u32, u32)) -> Self {
        Self::new(video_size, MarkerPose::NOT_FOUND, BlobSelection::NOT_FOUND)
    }
}

/// Field names and layout the consumer parses.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireRecord {
    #[serde(rename = "videoSize")]
    video_size: [u32; 2],
    /// [angle, x, y]
    bot1: [f64; 3],
    /// [size, x, y]
    ball: [f64; 3],
}

impl From<TelemetryRecord> for WireRecord {
    fn from(r: TelemetryRecord) -> Self {
        let pose = r.marker_pose;
        let blob = r.blob_selection;
        Self {
            video_size: [r.video_size.0, r.video_size.1],
            bot1: [pose.angle_degrees, pose.position.x, pose.position.y],
            ball: [blob.size_px, blob.position.x, blob.position.y],
        }
    }
}

impl From<WireRecord> for TelemetryRecord {
    fn from(w: WireRecord) -> Self {
        Self {
            video_size: (w.video_size[0], w.video_size[1]),
            marker_pose: MarkerPose::new(w.bot1[0], Point2::new(w.bot1[1], w.bot1[2])),
            blob_selection: BlobCandidate::new(w.ball[0], Point2::new(w.ball[1], w.ball[2])),
        }
    }
}

// --- Codec ---

/// Length-line framing for JSON bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSocketCodec;

impl Encoder<Bytes> for JsonSocketCodec {
    type Error = TransportError;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if body.len() > MAX_FRAME_LENGTH {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame of {} bytes exceeds {}", body.len(), MAX_FRAME_LENGTH),
            )));
        }
        let header = format!("{}\n", body.len());
        dst.reserve(header.len() + body.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(&body);
        Ok(())
    }
}

impl Decoder for JsonSocketCodec {
    type Item = BytesMut;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(newline) = src.iter().take(MAX_HEADER_LENGTH).position(|&b| b == b'\n') else {
            if src.len() >= MAX_HEADER_LENGTH {
                return Err(TransportError::Decode("missing length header".to_string()));
            }
            return Ok(None);
        };

        let length: usize = std::str::from_utf8(&src[..newline])
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| TransportError::Decode("malformed length header".to_string()))?;
        if length > MAX_FRAME_LENGTH {
            return Err(TransportError::Decode(format!(
                "frame of {} bytes exceeds {}",
                length, MAX_FRAME_LENGTH
            )));
        }

        let total = newline + 1 + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        src.advance(newline + 1);
        Ok(Some(src.split_to(length)))
    }
}

// --- Stream helpers ---

pub type MessageStream<T> = Framed<T, JsonSocketCodec>;

pub fn message_stream<T: AsyncRead + AsyncWrite>(io: T) -> MessageStream<T> {
    Framed::new(io, JsonSocketCodec)
}

pub fn encode_record(record: &TelemetryRecord) -> Result<Bytes, TransportError> {
    Ok(Bytes::from(serde_json::to_vec(record)?))
}

pub fn decode_record(body: &[u8]) -> Result<TelemetryRecord, TransportError> {
    Ok(serde_json::from_slice(body)?)
}

/// Serialize and push one record.
pub async fn send_record<S>(sink: &mut S, record: &TelemetryRecord) -> Result<(), TransportError>
where
    S: Sink<Bytes, Error = TransportError> + Unpin,
{
    let body = encode_record(record)?;
    sink.send(body).await
}

/// Receive the next record; a clean EOF is reported as [`TransportError::Closed`].
pub async fn recv_record<S>(stream: &mut S) -> Result<TelemetryRecord, TransportError>
where
    S: Stream<Item = Result<BytesMut, TransportError>> + Unpin,
{
    match stream.next().await {
        Some(Ok(body)) => decode_record(&body),
        Some(Err(e)) => Err(e),
        None => Err(TransportError::Closed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{compute_marker_pose, CornerQuad};
    use crate::vision::blob::{select, BlobWindow};

    fn sample_record() -> TelemetryRecord {
        let quad = CornerQuad::new(
            Point2::new(101.5, 52.25),
            Point2::new(141.0, 60.0),
            Point2::new(133.0, 99.75),
            Point2::new(93.5, 92.0),
        );
        let candidates = [
            BlobCandidate::new(22.5, Point2::new(400.25, 300.5)),
            BlobCandidate::new(47.125, Point2::new(410.0, 310.0)),
        ];
        TelemetryRecord::new(
            (640, 480),
            compute_marker_pose(&quad),
            select(&candidates, BlobWindow::default()),
        )
    }

    #[test]
    fn test_wire_field_names() {
        let record = TelemetryRecord::empty((640, 480));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["videoSize"], serde_json::json!([640, 480]));
        assert_eq!(json["bot1"], serde_json::json!([1000.0, 0.0, 0.0]));
        assert_eq!(json["ball"], serde_json::json!([1000.0, 0.0, 0.0]));
    }

    #[test]
    fn test_record_json_roundtrip() {
        let record = sample_record();
        let body = encode_record(&record).unwrap();
        let back = decode_record(&body).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_encode_writes_length_line() {
        let mut codec = JsonSocketCodec;
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"{\"a\":1}"), &mut buf).unwrap();
        assert_eq!(&buf[..], b"7\n{\"a\":1}");
    }

    #[test]
    fn test_decode_waits_for_full_frame() {
        let mut codec = JsonSocketCodec;
        let mut buf = BytesMut::from(&b"7\n{\"a\""[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b":1}12\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"{\"a\":1}");
        // 次のフレームのヘッダだけ残る
        assert_eq!(&buf[..], b"12\n");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_bad_header() {
        let mut codec = JsonSocketCodec;
        let mut buf = BytesMut::from(&b"abc\n{}"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(TransportError::Decode(_))));

        let mut buf = BytesMut::from(&b"{\"no\":\"header at all\"}"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(TransportError::Decode(_))));

        let mut buf = BytesMut::from(&b"999999999\n"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(TransportError::Decode(_))));
    }

    #[tokio::test]
    async fn test_framed_roundtrip_over_duplex() {
        let (a, b) = tokio::io::duplex(4096);
        let mut tx = message_stream(a);
        let mut rx = message_stream(b);

        let first = sample_record();
        let second = TelemetryRecord::empty((1280, 720));
        send_record(&mut tx, &first).await.unwrap();
        send_record(&mut tx, &second).await.unwrap();
        drop(tx);

        assert_eq!(recv_record(&mut rx).await.unwrap(), first);
        assert_eq!(recv_record(&mut rx).await.unwrap(), second);
        assert!(matches!(recv_record(&mut rx).await, Err(TransportError::Closed)));
    }
}
