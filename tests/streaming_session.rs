//! Integration tests for the streaming ASR/TTS sessions against in-process
//! mock Wyoming servers.

use serde_json::json;
use sotto::asr::{self, wyoming as asr_wyoming};
use sotto::audio::{AudioFormat, PcmSink, PcmSource};
use sotto::error::{AsrError, AudioError, TtsError};
use sotto::signals::StopSignal;
use sotto::tts::{self, wyoming as tts_wyoming};
use sotto::wyoming::{read_event, write_event, Event};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpListener;

const FORMAT: AudioFormat = AudioFormat {
    sample_rate: 16000,
    channels: 1,
};

/// ASR server that verifies chunk ordering and, after `audio-stop`, replies
/// with one partial and one final transcript naming the chunk count.
async fn ordering_asr_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        let mut chunks = 0u32;
        let mut expected = 0u8;
        let mut ordered = true;
        loop {
            let Some(event) = read_event(&mut reader).await.unwrap() else {
                return;
            };
            match event.event_type.as_str() {
                "transcribe" | "audio-start" => {}
                "audio-chunk" => {
                    // The tests stamp each chunk with its sequence number
                    if event.payload.first() != Some(&expected) {
                        ordered = false;
                    }
                    expected = expected.wrapping_add(1);
                    chunks += 1;
                }
                "audio-stop" => break,
                _ => {}
            }
        }

        let partial = Event::with_data("transcript-chunk", json!({ "text": "hello" }));
        write_event(&mut write, &partial).await.unwrap();

        let text = if ordered {
            format!("hello world ({} chunks)", chunks)
        } else {
            "chunks arrived out of order".to_string()
        };
        let final_event = Event::with_data("transcript", json!({ "text": text }));
        write_event(&mut write, &final_event).await.unwrap();
    });
    port
}

#[tokio::test]
async fn asr_session_preserves_order_and_ends_with_one_final() {
    let port = ordering_asr_server().await;
    let (mut sender, mut receiver) = asr_wyoming::connect("127.0.0.1", port, FORMAT)
        .await
        .unwrap();

    for i in 0..5u8 {
        sender.send_chunk(&[i; 64]).await.unwrap();
    }
    sender.end_stream().await.unwrap();

    let first = receiver.next_event().await.unwrap().unwrap();
    assert!(!first.is_final);
    assert_eq!(first.text, "hello");

    let last = receiver.next_event().await.unwrap().unwrap();
    assert!(last.is_final);
    assert_eq!(last.text, "hello world (5 chunks)");

    // The session is over: no further events
    assert!(receiver.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn asr_end_stream_twice_is_a_protocol_error() {
    // Server that accepts and reads until the client goes away
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, _write) = stream.into_split();
        let mut reader = BufReader::new(read);
        while read_event(&mut reader).await.unwrap().is_some() {}
    });

    let (mut sender, _receiver) = asr_wyoming::connect("127.0.0.1", port, FORMAT)
        .await
        .unwrap();
    sender.end_stream().await.unwrap();

    assert!(matches!(
        sender.end_stream().await,
        Err(AsrError::Protocol(_))
    ));
    assert!(matches!(
        sender.send_chunk(&[0; 16]).await,
        Err(AsrError::Protocol(_))
    ));
}

#[tokio::test]
async fn asr_connect_to_dead_port_is_unavailable() {
    // Bind and drop to find a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    assert!(matches!(
        asr_wyoming::connect("127.0.0.1", port, FORMAT).await,
        Err(AsrError::Unavailable(_))
    ));
}

/// Source that produces stamped chunks forever, until the pipeline stops
/// pulling from it.
struct InfiniteSource {
    counter: u8,
}

#[async_trait::async_trait]
impl PcmSource for InfiniteSource {
    fn format(&self) -> AudioFormat {
        FORMAT
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, AudioError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let stamp = self.counter;
        self.counter = self.counter.wrapping_add(1);
        Ok(Some(vec![stamp; 64]))
    }

    fn close(&mut self) {}
}

#[tokio::test]
async fn stop_signal_ends_stream_gracefully_and_drains_final_transcript() {
    let port = ordering_asr_server().await;
    let (sender, receiver) = asr_wyoming::connect("127.0.0.1", port, FORMAT)
        .await
        .unwrap();

    let stop = StopSignal::new();
    let trigger = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.set();
    });

    let mut source = InfiniteSource { counter: 0 };
    let transcript = asr::stream_transcript(sender, receiver, &mut source, &stop)
        .await
        .unwrap()
        .expect("the final transcript already in flight must not be lost");

    // The server only answers after a graceful audio-stop, and its reply
    // confirms every chunk arrived in send order
    assert!(transcript.starts_with("hello world ("));
    assert!(transcript.ends_with("chunks)"));
}

/// Sink that records everything written to it
#[derive(Default)]
struct VecSink {
    data: Vec<u8>,
}

#[async_trait::async_trait]
impl PcmSink for VecSink {
    async fn write(&mut self, pcm: Vec<u8>) -> Result<(), AudioError> {
        self.data.extend_from_slice(&pcm);
        Ok(())
    }

    fn close(&mut self) {}
}

/// TTS server streaming three marked chunks
async fn tts_server(chunk_gap: Duration) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        let request = read_event(&mut reader).await.unwrap().unwrap();
        assert_eq!(request.event_type, "synthesize");

        let start = Event::with_data(
            "audio-start",
            json!({ "rate": 22050, "width": 2, "channels": 1 }),
        );
        write_event(&mut write, &start).await.unwrap();

        for stamp in 1..=3u8 {
            let chunk = Event::with_payload(
                "audio-chunk",
                json!({ "rate": 22050, "width": 2, "channels": 1 }),
                vec![stamp; 10],
            );
            write_event(&mut write, &chunk).await.unwrap();
            tokio::time::sleep(chunk_gap).await;
        }

        write_event(&mut write, &Event::new("audio-stop"))
            .await
            .unwrap();
    });
    port
}

#[tokio::test]
async fn tts_session_streams_chunks_in_arrival_order() {
    let port = tts_server(Duration::ZERO).await;
    let mut session = tts_wyoming::connect("127.0.0.1", port).await.unwrap();
    session.synthesize("Hello, world!", None).await.unwrap();

    let format = session.await_audio_start().await.unwrap();
    assert_eq!(format.sample_rate, 22050);
    assert_eq!(format.channels, 1);

    let mut sink = VecSink::default();
    let stop = StopSignal::new();
    let delivered = tts::stream_to_sink(&mut session, &mut sink, &stop)
        .await
        .unwrap();

    assert_eq!(delivered, 30);
    let mut expected = Vec::new();
    for stamp in 1..=3u8 {
        expected.extend(std::iter::repeat(stamp).take(10));
    }
    assert_eq!(sink.data, expected);
}

#[tokio::test]
async fn tts_stop_abandons_remaining_chunks_without_error() {
    // Server pauses between chunks, so the stop lands mid-stream
    let port = tts_server(Duration::from_millis(200)).await;
    let mut session = tts_wyoming::connect("127.0.0.1", port).await.unwrap();
    session.synthesize("long text", None).await.unwrap();
    session.await_audio_start().await.unwrap();

    let stop = StopSignal::new();
    let trigger = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.set();
    });

    let mut sink = VecSink::default();
    let delivered = tts::stream_to_sink(&mut session, &mut sink, &stop)
        .await
        .unwrap();

    // Some prefix was played; the truncated tail is dropped, not an error
    assert!(delivered < 30);
    assert_eq!(sink.data.len(), delivered);
}

#[tokio::test]
async fn tts_synthesize_twice_is_a_protocol_error() {
    let port = tts_server(Duration::ZERO).await;
    let mut session = tts_wyoming::connect("127.0.0.1", port).await.unwrap();
    session.synthesize("once", None).await.unwrap();

    assert!(matches!(
        session.synthesize("twice", None).await,
        Err(TtsError::Protocol(_))
    ));
}

#[tokio::test]
async fn tts_chunks_before_audio_start_are_a_protocol_error() {
    let port = tts_server(Duration::ZERO).await;
    let mut session = tts_wyoming::connect("127.0.0.1", port).await.unwrap();
    session.synthesize("hello", None).await.unwrap();

    assert!(matches!(
        session.next_chunk().await,
        Err(TtsError::Protocol(_))
    ));
}

#[tokio::test]
async fn transcribe_source_dispatch_uses_wyoming_provider() {
    let port = ordering_asr_server().await;
    let mut config = sotto::Config::default();
    config.asr.wyoming.port = port;

    struct ThreeChunks {
        sent: u8,
    }

    #[async_trait::async_trait]
    impl PcmSource for ThreeChunks {
        fn format(&self) -> AudioFormat {
            FORMAT
        }

        async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, AudioError> {
            if self.sent == 3 {
                return Ok(None);
            }
            let stamp = self.sent;
            self.sent += 1;
            Ok(Some(vec![stamp; 64]))
        }

        fn close(&mut self) {}
    }

    let mut source = ThreeChunks { sent: 0 };
    let stop = StopSignal::new();
    let transcript = asr::transcribe_source(&config, &mut source, &stop)
        .await
        .unwrap();
    assert_eq!(transcript.as_deref(), Some("hello world (3 chunks)"));
}

#[tokio::test]
async fn asr_malformed_server_reply_is_a_protocol_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);
        loop {
            let Some(event) = read_event(&mut reader).await.unwrap() else {
                return;
            };
            if event.event_type == "audio-stop" {
                break;
            }
        }
        use tokio::io::AsyncWriteExt;
        write.write_all(b"this is not an event header\n").await.unwrap();
    });

    let (mut sender, mut receiver) = asr_wyoming::connect("127.0.0.1", port, FORMAT)
        .await
        .unwrap();
    sender.end_stream().await.unwrap();

    match receiver.next_event().await {
        Err(AsrError::Protocol(_)) => {}
        other => panic!("expected protocol error, got {:?}", other.map(|_| ())),
    }
}
