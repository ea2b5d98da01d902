//! Connection handling and SMTP commands.

use std::{borrow::Cow, sync::Arc};

use base64::{Engine, engine::general_purpose::STANDARD};
use courier_common::{incoming, internal, outgoing, tracing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{
        self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

use super::{
    error::{ClientError, Result},
    response::Response,
};

const BUFFER_SIZE: usize = 8192;

/// Upper bound on a single buffered reply.
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

enum Connection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Connection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };

        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn upgrade(self, domain: &str, accept_invalid_certs: bool) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            ));
        };

        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for cert in native.certs {
            roots
                .add(cert)
                .map_err(|e| ClientError::TlsError(format!("Failed to add certificate: {e}")))?;
        }
        if !native.errors.is_empty() {
            tracing::warn!(errors = ?native.errors, "Some native certificates could not be loaded");
        }

        let mut config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        if accept_invalid_certs {
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(AcceptAnyCertificate));
        }

        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| ClientError::TlsError(format!("Invalid domain: {e}")))?;

        let stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::TlsError(e.to_string()))?;

        Ok(Self::Tls(Box::new(stream)))
    }
}

/// Skips certificate validation, for relays with self-signed certificates.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ED25519,
        ]
    }
}

/// SASL mechanisms the client can authenticate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMechanism {
    Plain,
    Login,
}

impl AuthMechanism {
    /// Picks a mechanism from an EHLO reply.
    ///
    /// PLAIN is used unless the server only offers LOGIN.
    #[must_use]
    pub fn select(ehlo: &Response) -> Self {
        let offered = ehlo.extension_params("AUTH");
        let offers = |name: &str| offered.iter().any(|mechanism| mechanism == name);

        if offers("LOGIN") && !offers("PLAIN") {
            Self::Login
        } else {
            Self::Plain
        }
    }
}

/// One SMTP session with a relay.
pub struct SmtpClient {
    connection: Option<Connection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server_domain: String,
    accept_invalid_certs: bool,
}

impl SmtpClient {
    /// Opens a TCP connection to `addr`.
    ///
    /// `server_domain` is the name checked against the relay's certificate
    /// after STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str, server_domain: String) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        internal!(level = DEBUG, "Connected to {addr}");

        Ok(Self {
            connection: Some(Connection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            server_domain,
            accept_invalid_certs: false,
        })
    }

    /// Accept any certificate presented after STARTTLS.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self.connection, Some(Connection::Tls(_)))
    }

    /// Reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a raw command and reads the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        outgoing!("{command}");
        self.write_line(command).await?;
        self.read_response().await
    }

    /// Like [`Self::command`], but keeps `command` out of the trace log.
    async fn secret_command(&mut self, command: &str, label: &str) -> Result<Response> {
        outgoing!("{label} <redacted>");
        self.write_line(command).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message content followed by the end-of-data marker.
    ///
    /// Lines starting with `.` are dot-stuffed.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_data(&mut self, data: &str) -> Result<Response> {
        let content = dot_stuff(data);
        outgoing!("<{} bytes of message data>", content.len());

        let connection = self
            .connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;

        connection.send(content.as_bytes()).await?;
        if !content.is_empty() && !content.ends_with("\r\n") {
            connection.send(b"\r\n").await?;
        }
        connection.send(b".\r\n").await?;

        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Sends STARTTLS and, if the server agrees, upgrades the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the command or the TLS handshake fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            let connection = self
                .connection
                .take()
                .ok_or(ClientError::ConnectionClosed)?;
            self.connection = Some(
                connection
                    .upgrade(&self.server_domain, self.accept_invalid_certs)
                    .await?,
            );
            // Nothing read before the handshake may be trusted afterwards.
            self.buffer_pos = 0;
            internal!(level = DEBUG, "Upgraded connection to TLS");
        }

        Ok(response)
    }

    /// Authenticates with `username` and `password`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SmtpError` if the server rejects the credentials
    /// or any step of the exchange.
    pub async fn authenticate(
        &mut self,
        mechanism: AuthMechanism,
        username: &str,
        password: &str,
    ) -> Result<Response> {
        let response = match mechanism {
            AuthMechanism::Plain => {
                let token = STANDARD.encode(format!("\0{username}\0{password}"));
                self.secret_command(&format!("AUTH PLAIN {token}"), "AUTH PLAIN")
                    .await?
            }
            AuthMechanism::Login => {
                self.command("AUTH LOGIN")
                    .await?
                    .expect(Response::is_intermediate)?;
                self.secret_command(&STANDARD.encode(username), "username")
                    .await?
                    .expect(Response::is_intermediate)?;
                self.secret_command(&STANDARD.encode(password), "password")
                    .await?
            }
        };

        response.expect(Response::is_success)
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let data = format!("{line}\r\n");
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(data.as_bytes())
            .await
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{} {}", response.code, response.message());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let grown = self.buffer.len() * 2;
                if grown > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(grown, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}

/// Doubles the leading `.` of every line (RFC 5321 section 4.5.2).
fn dot_stuff(data: &str) -> Cow<'_, str> {
    if !data.starts_with('.') && !data.contains("\n.") {
        return Cow::Borrowed(data);
    }

    let mut stuffed = String::with_capacity(data.len() + 8);
    for line in data.split_inclusive('\n') {
        if line.starts_with('.') {
            stuffed.push('.');
        }
        stuffed.push_str(line);
    }
    Cow::Owned(stuffed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::TcpListener,
        task::JoinHandle,
    };

    use super::*;

    /// Accepts one connection, greets, then answers each received line with
    /// the next scripted reply. Message content between `DATA` and the final
    /// `.` is collected without consuming replies.
    async fn scripted_server(replies: Vec<&'static str>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            let mut received = Vec::new();
            let mut in_data = false;

            writer.write_all(b"220 test.example.com ESMTP\r\n").await.unwrap();

            let mut replies = replies.into_iter();
            let mut line = String::new();
            while reader.read_line(&mut line).await.unwrap() > 0 {
                let trimmed = line.trim_end_matches("\r\n").to_string();
                line.clear();

                if in_data && trimmed != "." {
                    received.push(trimmed);
                    continue;
                }
                in_data = false;

                if trimmed == "DATA" {
                    in_data = true;
                }
                received.push(trimmed);

                let Some(reply) = replies.next() else { break };
                writer.write_all(reply.as_bytes()).await.unwrap();
            }

            received
        });

        (addr, handle)
    }

    #[test]
    fn test_dot_stuffing() {
        assert_eq!(dot_stuff("Hello\r\nWorld\r\n"), "Hello\r\nWorld\r\n");
        assert_eq!(dot_stuff(".start\r\nmid\r\n.\r\n"), "..start\r\nmid\r\n..\r\n");
        assert!(matches!(dot_stuff("no dots here"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_auth_mechanism_selection() {
        let ehlo = |auth: &str| {
            Response::new(250, vec!["relay".to_string(), auth.to_string()])
        };

        assert_eq!(AuthMechanism::select(&ehlo("AUTH LOGIN")), AuthMechanism::Login);
        assert_eq!(
            AuthMechanism::select(&ehlo("AUTH LOGIN PLAIN")),
            AuthMechanism::Plain
        );
        assert_eq!(AuthMechanism::select(&ehlo("SIZE 100")), AuthMechanism::Plain);
    }

    #[tokio::test]
    async fn test_full_transaction() {
        let (addr, server) = scripted_server(vec![
            "250-test.example.com\r\n250 AUTH PLAIN\r\n",
            "250 OK\r\n",
            "250 OK\r\n",
            "354 Go ahead\r\n",
            "250 Queued\r\n",
            "221 Bye\r\n",
        ])
        .await;

        let mut client = SmtpClient::connect(&addr, "localhost".to_string())
            .await
            .unwrap();
        assert_eq!(client.read_greeting().await.unwrap().code, 220);

        let ehlo = client.ehlo("client.example.com").await.unwrap();
        assert!(ehlo.advertises("AUTH"));
        assert_eq!(client.mail_from("a@example.com").await.unwrap().code, 250);
        assert_eq!(client.rcpt_to("b@example.com").await.unwrap().code, 250);
        assert_eq!(client.data().await.unwrap().code, 354);
        assert_eq!(
            client
                .send_data("Subject: hi\r\n\r\n.hidden\r\n")
                .await
                .unwrap()
                .code,
            250
        );
        assert_eq!(client.quit().await.unwrap().code, 221);
        assert!(!client.is_tls());

        drop(client);
        let received = server.await.unwrap();
        assert_eq!(
            received,
            vec![
                "EHLO client.example.com",
                "MAIL FROM:<a@example.com>",
                "RCPT TO:<b@example.com>",
                "DATA",
                "Subject: hi",
                "",
                "..hidden",
                ".",
                "QUIT",
            ]
        );
    }

    #[tokio::test]
    async fn test_auth_login_exchange() {
        let (addr, server) = scripted_server(vec![
            "334 VXNlcm5hbWU6\r\n",
            "334 UGFzc3dvcmQ6\r\n",
            "235 Authenticated\r\n",
        ])
        .await;

        let mut client = SmtpClient::connect(&addr, "localhost".to_string())
            .await
            .unwrap();
        client.read_greeting().await.unwrap();

        let response = client
            .authenticate(AuthMechanism::Login, "user", "secret")
            .await
            .unwrap();
        assert_eq!(response.code, 235);

        drop(client);
        let received = server.await.unwrap();
        assert_eq!(
            received,
            vec![
                "AUTH LOGIN".to_string(),
                STANDARD.encode("user"),
                STANDARD.encode("secret"),
            ]
        );
    }

    #[tokio::test]
    async fn test_auth_plain_rejected() {
        let (addr, _server) =
            scripted_server(vec!["535 5.7.8 Authentication credentials invalid\r\n"]).await;

        let mut client = SmtpClient::connect(&addr, "localhost".to_string())
            .await
            .unwrap();
        client.read_greeting().await.unwrap();

        let error = client
            .authenticate(AuthMechanism::Plain, "user", "wrong")
            .await
            .unwrap_err();
        assert_eq!(error.code(), Some(535));
        assert!(error.is_permanent());
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let (addr, _server) = scripted_server(vec![]).await;

        let mut client = SmtpClient::connect(&addr, "localhost".to_string())
            .await
            .unwrap();
        client.read_greeting().await.unwrap();

        let error = client.ehlo("client.example.com").await.unwrap_err();
        assert!(matches!(
            error,
            ClientError::ConnectionClosed | ClientError::Io(_)
        ));
    }
}
