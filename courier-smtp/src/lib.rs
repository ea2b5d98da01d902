//! A small async SMTP client used by the courier delivery loop.
//!
//! The client speaks just enough ESMTP to hand a message to a relay:
//! EHLO/HELO, STARTTLS, AUTH PLAIN and LOGIN, MAIL, RCPT, DATA and QUIT.
//! [`client::MessageBuilder`] renders the RFC 5322 message handed to DATA.

pub mod client;
