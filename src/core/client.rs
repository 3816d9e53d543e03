use crate::core::http::{HttpConfig, HttpTransport};
use crate::core::socket::{SocketConfig, SocketTransport};
use crate::domain::image::{CaptchaImage, UploadOptions};
use crate::domain::model::{CaptchaRecord, Command, Credentials, Payload, UserAccount};
use crate::domain::ports::Transport;
use crate::utils::error::{CaptchaError, Result};
use serde_json::Value;
use std::time::{Duration, Instant};

pub const DEFAULT_DECODE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Service API written once against any [`Transport`].
///
/// Every method blocks. The transport is closed when the client is dropped.
pub struct Client<T: Transport> {
    transport: T,
    poll_interval: Duration,
    default_timeout: Duration,
}

pub type SocketClient = Client<SocketTransport>;
pub type HttpClient = Client<HttpTransport>;

impl Client<SocketTransport> {
    pub fn socket(credentials: Credentials, config: SocketConfig) -> Self {
        Self::new(SocketTransport::new(credentials, config))
    }
}

impl Client<HttpTransport> {
    pub fn http(credentials: Credentials, config: HttpConfig) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(credentials, config)?))
    }
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_timeout: DEFAULT_DECODE_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Timeout used by [`Client::decode`] when none (or zero) is given.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn get_user(&mut self) -> Result<Option<UserAccount>> {
        let response = self.transport.call(Command::User, Payload::new())?;
        Ok(UserAccount::from_response(&response))
    }

    /// Balance in US cents.
    pub fn get_balance(&mut self) -> Result<Option<f64>> {
        Ok(self.get_user()?.map(|user| user.balance))
    }

    /// Uploads an image. Empty images are rejected before anything is sent.
    pub fn upload(
        &mut self,
        image: &CaptchaImage,
        options: &UploadOptions,
    ) -> Result<Option<CaptchaRecord>> {
        if image.is_empty() {
            return Err(CaptchaError::invalid_captcha("CAPTCHA image is empty"));
        }

        let mut payload = Payload::new();
        payload.insert("captcha".to_string(), Value::String(image.to_base64()));
        options.write_into(&mut payload);

        tracing::debug!("Uploading CAPTCHA ({} bytes)", image.len());
        let response = self.transport.call(Command::Upload, payload)?;
        let record = CaptchaRecord::from_response(&response);
        if let Some(record) = &record {
            tracing::info!("Uploaded CAPTCHA {}", record.id);
        }
        Ok(record)
    }

    pub fn get_captcha(&mut self, id: u64) -> Result<Option<CaptchaRecord>> {
        if id == 0 {
            return Ok(None);
        }
        let response = self.transport.call(Command::Captcha, id_payload(id))?;
        Ok(CaptchaRecord::from_response(&response))
    }

    pub fn get_text(&mut self, id: u64) -> Result<Option<String>> {
        Ok(self.get_captcha(id)?.and_then(|record| record.text))
    }

    /// Reports a wrong answer. Returns `true` once the service marks the
    /// CAPTCHA as incorrect.
    pub fn report(&mut self, id: u64) -> Result<bool> {
        if id == 0 {
            return Ok(false);
        }
        let response = self.transport.call(Command::Report, id_payload(id))?;
        let still_correct = CaptchaRecord::from_response(&response)
            .map(|record| record.is_correct)
            .unwrap_or(false);
        Ok(!still_correct)
    }

    /// Uploads an image and polls until it is solved or the deadline passes.
    ///
    /// Returns `Ok(None)` when no correct answer arrived in time. A fetch that
    /// starts before the deadline is allowed to finish, so the call returns
    /// within the timeout plus one poll interval (and one round trip).
    pub fn decode(
        &mut self,
        image: &CaptchaImage,
        options: &UploadOptions,
        timeout: Option<Duration>,
    ) -> Result<Option<CaptchaRecord>> {
        let timeout = timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(self.default_timeout);
        let deadline = Instant::now() + timeout;

        let mut record = self.upload(image, options)?;
        while let Some(current) = record.as_ref().filter(|r| !r.is_solved()) {
            if Instant::now() >= deadline {
                break;
            }
            let id = current.id;
            std::thread::sleep(self.poll_interval);
            tracing::debug!("Polling CAPTCHA {}", id);
            record = self.get_captcha(id)?;
        }

        match record {
            Some(record) if record.is_solved() && record.is_correct => {
                tracing::info!("CAPTCHA {} solved", record.id);
                Ok(Some(record))
            }
            Some(record) => {
                tracing::warn!("CAPTCHA {} not solved within {:?}", record.id, timeout);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn close(&mut self) {
        self.transport.close();
    }
}

impl<T: Transport> Drop for Client<T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}

fn id_payload(id: u64) -> Payload {
    let mut payload = Payload::new();
    payload.insert("captcha".to_string(), Value::from(id));
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ErrorKind;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    type Script = VecDeque<Result<Payload>>;

    /// Replays canned responses and records what was asked.
    #[derive(Clone, Default)]
    struct ScriptedTransport {
        responses: Arc<Mutex<Script>>,
        calls: Arc<Mutex<Vec<(Command, Payload)>>>,
        closed: Arc<Mutex<usize>>,
        fallback: Option<Value>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Value>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(
                    responses.into_iter().map(|v| Ok(object(v))).collect(),
                )),
                ..Self::default()
            }
        }

        fn failing(error: CaptchaError) -> Self {
            let transport = Self::default();
            transport.responses.lock().unwrap().push_back(Err(error));
            transport
        }

        /// Answers with `value` once the script runs out.
        fn repeating(mut self, value: Value) -> Self {
            self.fallback = Some(value);
            self
        }

        fn calls(&self) -> Vec<(Command, Payload)> {
            self.calls.lock().unwrap().clone()
        }

        fn commands(&self) -> Vec<Command> {
            self.calls().into_iter().map(|(command, _)| command).collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn call(&mut self, command: Command, payload: Payload) -> Result<Payload> {
            self.calls.lock().unwrap().push((command, payload));
            match self.responses.lock().unwrap().pop_front() {
                Some(response) => response,
                None => match &self.fallback {
                    Some(value) => Ok(object(value.clone())),
                    None => Err(CaptchaError::server("script exhausted")),
                },
            }
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() += 1;
        }
    }

    fn object(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn png() -> CaptchaImage {
        CaptchaImage::from_bytes(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    #[test]
    fn test_get_user_and_balance() {
        let transport = ScriptedTransport::new(vec![
            json!({"user": 5, "balance": 250.5, "is_banned": false}),
            json!({"user": 5, "balance": 249.0, "is_banned": false}),
        ]);
        let mut client = Client::new(transport.clone());

        let user = client.get_user().unwrap().unwrap();
        assert_eq!(user.id, 5);
        assert_eq!(user.balance, 250.5);
        assert_eq!(client.get_balance().unwrap(), Some(249.0));
        assert_eq!(transport.commands(), vec![Command::User, Command::User]);
    }

    #[test]
    fn test_get_user_without_account_is_none() {
        let mut client = Client::new(ScriptedTransport::new(vec![json!({"user": 0})]));
        assert_eq!(client.get_user().unwrap(), None);
    }

    #[test]
    fn test_upload_sends_base64_and_options() {
        let transport =
            ScriptedTransport::new(vec![json!({"captcha": 42, "text": null, "is_correct": false})]);
        let mut client = Client::new(transport.clone());

        let options = UploadOptions::default().with_banner_text("type the letters");
        let record = client.upload(&png(), &options).unwrap().unwrap();

        assert_eq!(
            record,
            CaptchaRecord {
                id: 42,
                text: None,
                is_correct: false
            }
        );
        let calls = transport.calls();
        assert_eq!(calls[0].0, Command::Upload);
        assert_eq!(calls[0].1["captcha"], png().to_base64());
        assert_eq!(calls[0].1["banner_text"], "type the letters");
    }

    #[test]
    fn test_upload_empty_image_fails_before_calling_transport() {
        let transport = ScriptedTransport::new(vec![]);
        let mut client = Client::new(transport.clone());

        let err = client
            .upload(&CaptchaImage::from_bytes(Vec::new()), &UploadOptions::default())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidCaptcha);
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_get_captcha_and_text() {
        let transport = ScriptedTransport::new(vec![
            json!({"captcha": 42, "text": "ab12", "is_correct": true}),
            json!({"captcha": 42, "text": "ab12", "is_correct": true}),
        ]);
        let mut client = Client::new(transport.clone());

        let record = client.get_captcha(42).unwrap().unwrap();
        assert_eq!(record.id, 42);
        assert_eq!(client.get_text(42).unwrap().as_deref(), Some("ab12"));
        assert_eq!(transport.calls()[0].1["captcha"], 42);
    }

    #[test]
    fn test_zero_id_does_not_hit_transport() {
        let transport = ScriptedTransport::new(vec![]);
        let mut client = Client::new(transport.clone());

        assert_eq!(client.get_captcha(0).unwrap(), None);
        assert!(!client.report(0).unwrap());
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_report_is_accepted_when_marked_incorrect() {
        let mut client = Client::new(ScriptedTransport::new(vec![
            json!({"captcha": 42, "text": "ab12", "is_correct": false}),
            json!({"captcha": 42, "text": "ab12", "is_correct": true}),
        ]));

        assert!(client.report(42).unwrap());
        assert!(!client.report(42).unwrap());
    }

    #[test]
    fn test_decode_polls_until_solved() {
        let transport = ScriptedTransport::new(vec![
            json!({"captcha": 42, "text": "", "is_correct": false}),
            json!({"captcha": 42, "text": "", "is_correct": false}),
            json!({"captcha": 42, "text": "ab12", "is_correct": true}),
        ]);
        let mut client =
            Client::new(transport.clone()).with_poll_interval(Duration::from_millis(5));

        let record = client
            .decode(&png(), &UploadOptions::default(), Some(Duration::from_secs(60)))
            .unwrap()
            .unwrap();

        assert_eq!(record.text.as_deref(), Some("ab12"));
        assert_eq!(
            transport.commands(),
            vec![Command::Upload, Command::Captcha, Command::Captcha]
        );
    }

    #[test]
    fn test_decode_returns_none_after_deadline() {
        let unsolved = json!({"captcha": 7, "text": "", "is_correct": false});
        let transport = ScriptedTransport::new(vec![]).repeating(unsolved);
        let poll = Duration::from_millis(20);
        let timeout = Duration::from_millis(100);
        let mut client = Client::new(transport.clone()).with_poll_interval(poll);

        let started = Instant::now();
        let result = client
            .decode(&png(), &UploadOptions::default(), Some(timeout))
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result, None);
        assert!(elapsed >= timeout);
        assert!(
            elapsed < timeout + poll + Duration::from_millis(200),
            "decode took {:?}",
            elapsed
        );
        assert!(transport.commands().len() > 1);
    }

    #[test]
    fn test_decode_solved_but_incorrect_is_none() {
        let mut client = Client::new(ScriptedTransport::new(vec![
            json!({"captcha": 9, "text": "", "is_correct": false}),
            json!({"captcha": 9, "text": "oops", "is_correct": false}),
        ]))
        .with_poll_interval(Duration::from_millis(1));

        let result = client
            .decode(&png(), &UploadOptions::default(), Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_decode_without_upload_record_is_none() {
        let transport = ScriptedTransport::new(vec![json!({"captcha": 0})]);
        let mut client = Client::new(transport.clone());

        let result = client
            .decode(&png(), &UploadOptions::default(), None)
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(transport.commands(), vec![Command::Upload]);
    }

    #[test]
    fn test_decode_zero_timeout_uses_default() {
        let transport = ScriptedTransport::new(vec![
            json!({"captcha": 3, "text": "", "is_correct": false}),
            json!({"captcha": 3, "text": "done", "is_correct": true}),
        ]);
        let mut client = Client::new(transport)
            .with_poll_interval(Duration::from_millis(1))
            .with_default_timeout(Duration::from_secs(5));

        let record = client
            .decode(&png(), &UploadOptions::default(), Some(Duration::ZERO))
            .unwrap();
        assert_eq!(record.unwrap().text.as_deref(), Some("done"));
    }

    #[test]
    fn test_errors_are_not_swallowed() {
        let mut client = Client::new(ScriptedTransport::failing(CaptchaError::ServiceOverload));
        let err = client
            .decode(&png(), &UploadOptions::default(), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceOverload);
    }

    #[test]
    fn test_drop_closes_transport() {
        let transport = ScriptedTransport::new(vec![]);
        let closed = transport.closed.clone();
        {
            let mut client = Client::new(transport);
            client.close();
        }
        assert_eq!(*closed.lock().unwrap(), 2);
    }

    #[test]
    fn test_boxed_transport_works_with_client() {
        let boxed: Box<dyn Transport> = Box::new(ScriptedTransport::new(vec![
            json!({"user": 1, "balance": 0, "is_banned": true}),
        ]));
        let mut client = Client::new(boxed);
        assert!(client.get_user().unwrap().unwrap().is_banned);
    }
}
