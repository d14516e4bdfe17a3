//! Integration tests for the parley library.
//! The live tests require an API key in the environment to run; the rest use
//! scripted services and a local SSE server.

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::stream;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use parley::chat::{ChatConfig, ChatSession};
    use parley::{
        ConversationStore, Error, GenerateContentParams, GenerateContentResponse, Gemini,
        KnownModel, Model, ModelService, RecordingSink, ResponseStream, Role, StreamingResponder,
        Turn,
    };

    /// One scripted reply per request, in order.
    enum Reply {
        Chunks(Vec<&'static str>),
        OpenFailure(Error),
        ReadFailure(Vec<&'static str>, Error),
    }

    struct ScriptedModel {
        replies: Mutex<Vec<Reply>>,
        requests: Mutex<Vec<GenerateContentParams>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn next(&self, params: GenerateContentParams) -> Reply {
            self.requests.lock().unwrap().push(params);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Reply::Chunks(Vec::new()))
        }
    }

    #[async_trait::async_trait]
    impl ModelService for ScriptedModel {
        async fn generate(
            &self,
            params: GenerateContentParams,
        ) -> parley::Result<GenerateContentResponse> {
            match self.next(params) {
                Reply::Chunks(chunks) => Ok(GenerateContentResponse::from_text(chunks.concat())),
                Reply::OpenFailure(err) | Reply::ReadFailure(_, err) => Err(err),
            }
        }

        async fn generate_stream(
            &self,
            params: GenerateContentParams,
        ) -> parley::Result<ResponseStream> {
            let items: Vec<parley::Result<GenerateContentResponse>> = match self.next(params) {
                Reply::Chunks(chunks) => chunks
                    .into_iter()
                    .map(|c| Ok(GenerateContentResponse::from_text(c)))
                    .collect(),
                Reply::OpenFailure(err) => return Err(err),
                Reply::ReadFailure(chunks, err) => chunks
                    .into_iter()
                    .map(|c| Ok(GenerateContentResponse::from_text(c)))
                    .chain(std::iter::once(Err(err)))
                    .collect(),
            };
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn session(model: Arc<ScriptedModel>) -> ChatSession<Arc<ScriptedModel>> {
        ChatSession::with_service(model, ChatConfig::new().with_pacing(Duration::ZERO))
    }

    #[tokio::test]
    async fn test_round_trips_always_add_two_turns() {
        let model = ScriptedModel::new(vec![
            Reply::Chunks(vec!["Hel", "lo"]),
            Reply::OpenFailure(Error::timeout("timeout", None)),
            Reply::ReadFailure(vec!["par", "tial"], Error::streaming("connection reset", None)),
            Reply::Chunks(vec![]),
        ]);
        let mut session = session(model.clone());
        let mut sink = RecordingSink::default();

        let expected = ["Hello", "Error: timeout", "Error: connection reset", ""];
        for (n, want) in expected.iter().enumerate() {
            let reply = session.send_streaming("hi", &mut sink).await;
            assert_eq!(reply.role(), Role::Model);
            assert_eq!(reply.content(), *want);
            assert_eq!(session.message_count(), 2 * (n + 1));
        }
        assert_eq!(sink.finals, expected);

        let roles: Vec<_> = session.history().iter().map(Turn::role).collect();
        assert_eq!(
            roles,
            [Role::User, Role::Model].repeat(expected.len())
        );
    }

    #[tokio::test]
    async fn test_final_render_has_no_marker() {
        let model = ScriptedModel::new(vec![Reply::Chunks(vec!["Hel", "lo"])]);
        let mut session = session(model);
        let mut sink = RecordingSink::default();
        session.send_streaming("hi", &mut sink).await;

        assert_eq!(sink.partials.len(), 5);
        assert_eq!(sink.partials[0], "H⠋");
        assert_eq!(sink.partials[4], "Hello⠼");
        assert_eq!(sink.finals, vec!["Hello"]);
    }

    #[tokio::test]
    async fn test_document_context_is_truncated_and_hidden() {
        let model = ScriptedModel::new(vec![Reply::Chunks(vec!["A summary."])]);
        let mut session = ChatSession::with_service(
            model.clone(),
            ChatConfig::new()
                .with_pacing(Duration::ZERO)
                .with_max_context_chars(64),
        );
        session.attach_document("paper.txt", "z".repeat(1000));
        session
            .send_streaming("summarize", &mut RecordingSink::default())
            .await;

        let requests = model.requests.lock().unwrap();
        let outgoing = requests[0].request.contents[0].text().unwrap();
        let (context, query) = outgoing.split_once("\n\nUser Query: ").unwrap();
        let context = context
            .strip_prefix("Context from uploaded documents:\n")
            .unwrap();
        assert_eq!(context.chars().count(), 64);
        assert!(context.starts_with("--- paper.txt ---\n"));
        assert_eq!(query, "summarize");

        assert_eq!(session.history()[0].display_text(), "summarize");
        assert_eq!(session.history()[0].content(), outgoing);
    }

    #[tokio::test]
    async fn test_full_history_is_resent() {
        let model = ScriptedModel::new(vec![
            Reply::Chunks(vec!["one"]),
            Reply::OpenFailure(Error::timeout("timeout", None)),
            Reply::Chunks(vec!["three"]),
        ]);
        let mut session = session(model.clone());
        let mut sink = RecordingSink::default();
        for input in ["a", "b", "c"] {
            session.send_streaming(input, &mut sink).await;
        }

        let requests = model.requests.lock().unwrap();
        let last: Vec<_> = requests[2]
            .request
            .contents
            .iter()
            .map(|c| c.text().unwrap_or_default())
            .collect();
        assert_eq!(last, vec!["a", "one", "b", "Error: timeout", "c"]);
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_per_request() {
        let client = Gemini::with_options(Some(String::new()), None, None).unwrap();
        assert!(!client.has_api_key());

        let responder = StreamingResponder::new(client).with_pacing(Duration::ZERO);
        let mut store = ConversationStore::new();
        store.append(Turn::user("hello"));
        let mut sink = RecordingSink::default();
        let reply = responder.respond_streaming(&store, &mut sink).await;
        assert!(reply.content().starts_with("Error: API key not provided"));
        assert_eq!(sink.finals.len(), 1);
        assert!(sink.partials.is_empty());
    }

    #[test]
    fn test_blocking_runtime_round_trip() {
        let model = ScriptedModel::new(vec![Reply::Chunks(vec!["Hel", "lo"])]);
        let mut session = session(model);
        let mut sink = RecordingSink::default();
        let content = tokio_test::block_on(async {
            session.send("hi", &mut sink).await.content().to_string()
        });
        assert_eq!(content, "Hello");
        assert_eq!(sink.finals, vec!["Hello"]);
    }

    /// Serve one canned HTTP response and return the raw request it answered.
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        serve_parts(vec![(Duration::ZERO, response)]).await
    }

    /// Accept one request, then write each part after its delay.
    async fn serve_parts(
        parts: Vec<(Duration, String)>,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1beta/", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            for (delay, part) in parts {
                tokio::time::sleep(delay).await;
                if socket.write_all(part.as_bytes()).await.is_err() {
                    break;
                }
            }
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&request).into_owned()
        });
        (base_url, handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        body.len() >= length
    }

    #[tokio::test]
    async fn test_streaming_over_sse() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hel\"}]}}]}\r\n\r\n",
            ": keep-alive\n\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"lo\"}]}}]}\n\n",
        );
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{body}"
        );
        let (base_url, server) = serve_once(response).await;

        let client =
            Gemini::with_options(Some("test-key".to_string()), Some(base_url), None).unwrap();
        let mut session = ChatSession::with_service(
            client,
            ChatConfig::new()
                .with_model(Model::Known(KnownModel::Gemini25Flash))
                .with_pacing(Duration::ZERO),
        );
        let mut sink = RecordingSink::default();
        let reply = session.send_streaming("hi", &mut sink).await;
        assert_eq!(reply.content(), "Hello");

        let request = server.await.unwrap();
        assert!(request.starts_with(
            "POST /v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse HTTP/1.1"
        ));
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
        assert!(request.contains("\"contents\":[{\"role\":\"user\",\"parts\":[{\"text\":\"hi\"}]}]"));
    }

    const SSE_HEAD: &str =
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";

    fn sse_text(text: &str) -> String {
        format!(
            "data: {{\"candidates\":[{{\"content\":{{\"role\":\"model\",\"parts\":[{{\"text\":\"{text}\"}}]}}}}]}}\n\n"
        )
    }

    #[tokio::test]
    async fn test_paced_stream_outlives_request_timeout() {
        let gap = Duration::from_millis(400);
        let (base_url, server) = serve_parts(vec![
            (Duration::ZERO, format!("{SSE_HEAD}{}", sse_text("one "))),
            (gap, sse_text("two ")),
            (gap, sse_text("three ")),
            (gap, sse_text("four")),
        ])
        .await;

        let client = Gemini::with_options(
            Some("test-key".to_string()),
            Some(base_url),
            Some(Duration::from_secs(1)),
        )
        .unwrap();
        let mut session = ChatSession::with_service(
            client,
            ChatConfig::new().with_pacing(Duration::from_millis(15)),
        );
        let start = std::time::Instant::now();
        let mut sink = RecordingSink::default();
        let reply = session.send_streaming("count", &mut sink).await;

        assert_eq!(reply.content(), "one two three four");
        assert!(start.elapsed() > Duration::from_secs(1));
        assert_eq!(sink.partials.len(), "one two three four".len());
        assert_eq!(sink.finals, vec!["one two three four"]);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_stalled_stream_becomes_error_turn() {
        let (base_url, _server) = serve_parts(vec![
            (Duration::ZERO, format!("{SSE_HEAD}{}", sse_text("Hel"))),
            (Duration::from_secs(5), sse_text("lo")),
        ])
        .await;

        let client = Gemini::with_options(
            Some("test-key".to_string()),
            Some(base_url),
            Some(Duration::from_millis(300)),
        )
        .unwrap();
        let mut session = ChatSession::with_service(
            client,
            ChatConfig::new().with_pacing(Duration::from_millis(5)),
        );
        let mut sink = RecordingSink::default();
        let reply = session.send_streaming("hi", &mut sink).await;

        assert!(
            reply.content().starts_with("Error: No data received"),
            "unexpected reply: {}",
            reply.content()
        );
        assert!(sink.partials.last().unwrap().starts_with("Hel"));
        assert_eq!(sink.finals, vec![reply.content().to_string()]);
        assert_eq!(session.message_count(), 2);
    }

    #[tokio::test]
    async fn test_blocked_prompt_over_sse() {
        let response = format!("{SSE_HEAD}data: {{\"promptFeedback\":{{\"blockReason\":\"SAFETY\"}}}}\n\n");
        let (base_url, server) = serve_once(response).await;

        let client =
            Gemini::with_options(Some("test-key".to_string()), Some(base_url), None).unwrap();
        let mut session =
            ChatSession::with_service(client, ChatConfig::new().with_pacing(Duration::ZERO));
        let reply = session
            .send_streaming("something unsafe", &mut RecordingSink::default())
            .await;
        assert_eq!(reply.content(), "Error: prompt blocked: SAFETY");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_blocked_prompt_without_streaming() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let (base_url, server) = serve_once(response).await;

        let client =
            Gemini::with_options(Some("test-key".to_string()), Some(base_url), None).unwrap();
        let mut session = ChatSession::with_service(
            client,
            ChatConfig::new()
                .with_streaming(false)
                .with_pacing(Duration::ZERO),
        );
        let reply = session
            .submit("something unsafe", &mut RecordingSink::default())
            .await;
        assert_eq!(reply.content(), "Error: prompt blocked: SAFETY");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_error_becomes_error_turn() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        let response = format!(
            "HTTP/1.1 400 Bad Request\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let (base_url, server) = serve_once(response).await;

        let client = Gemini::with_options(Some("bad-key".to_string()), Some(base_url), None).unwrap();
        let mut session =
            ChatSession::with_service(client, ChatConfig::new().with_pacing(Duration::ZERO));
        let reply = session
            .send_streaming("hi", &mut RecordingSink::default())
            .await;
        assert_eq!(
            reply.content(),
            "Error: API key not valid. Please pass a valid API key."
        );
        assert_eq!(session.message_count(), 2);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_simple_message_request() {
        // This test requires GEMINI_API_KEY to be set
        let api_key = std::env::var("GEMINI_API_KEY").ok();
        if api_key.is_none() {
            eprintln!("Skipping test: GEMINI_API_KEY not set");
            return;
        }

        let client = Gemini::new(api_key).expect("Failed to create client");
        let mut session = ChatSession::with_service(
            client,
            ChatConfig::new()
                .with_max_tokens(16)
                .with_pacing(Duration::ZERO),
        );
        let reply = session
            .send("Say 'test passed'", &mut RecordingSink::default())
            .await;
        assert!(
            !reply.content().starts_with("Error:"),
            "Request should succeed with valid API key: {}",
            reply.content()
        );
    }

    #[tokio::test]
    async fn test_streaming_response() {
        let api_key = std::env::var("GEMINI_API_KEY").ok();
        if api_key.is_none() {
            eprintln!("Skipping test: GEMINI_API_KEY not set");
            return;
        }

        let client = Gemini::new(api_key).expect("Failed to create client");
        let mut session = ChatSession::with_service(
            client,
            ChatConfig::new()
                .with_max_tokens(32)
                .with_pacing(Duration::ZERO),
        );
        let mut sink = RecordingSink::default();
        let reply = session.send_streaming("Count to 3", &mut sink).await;
        assert!(!reply.content().starts_with("Error:"), "{}", reply.content());
        assert_eq!(sink.finals.len(), 1);
    }
}
