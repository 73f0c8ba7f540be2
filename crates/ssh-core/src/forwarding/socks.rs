//! SOCKS5 handshake for dynamic forwards (RFC 1928, CONNECT only).

use std::{fmt, net::Ipv4Addr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{SshCoreError, SshResult};

const SOCKS_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;

/// Destination requested by a SOCKS5 client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocksTarget {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for SocksTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Outcome sent back to the client once the tunnel dial finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocksReply {
    Succeeded,
    GeneralFailure,
}

impl SocksReply {
    fn code(self) -> u8 {
        match self {
            SocksReply::Succeeded => 0x00,
            SocksReply::GeneralFailure => 0x01,
        }
    }
}

/// Run method selection and read the CONNECT request.
///
/// Method selection always answers "no authentication required". Any
/// malformed request fails without writing a reply; the caller just drops
/// the connection.
pub async fn negotiate<S>(stream: &mut S) -> SshResult<SocksTarget>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let mut greeting = [0u8; 2];
    stream.read_exact(&mut greeting).await?;
    if greeting[0] != SOCKS_VERSION {
        return Err(SshCoreError::socks(format!("unsupported version {}", greeting[0])));
    }
    if greeting[1] == 0 {
        return Err(SshCoreError::socks("client offered no authentication methods"));
    }
    let mut methods = vec![0u8; greeting[1] as usize];
    stream.read_exact(&mut methods).await?;
    stream.write_all(&[SOCKS_VERSION, METHOD_NO_AUTH]).await?;

    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await?;
    if request[0] != SOCKS_VERSION {
        return Err(SshCoreError::socks(format!("unsupported request version {}", request[0])));
    }
    if request[1] != CMD_CONNECT {
        return Err(SshCoreError::socks(format!("unsupported command 0x{:02x}", request[1])));
    }

    let host = match request[3] {
        ATYP_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            Ipv4Addr::from(addr).to_string()
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            if len[0] == 0 {
                return Err(SshCoreError::socks("empty domain name"));
            }
            let mut name = vec![0u8; len[0] as usize];
            stream.read_exact(&mut name).await?;
            String::from_utf8(name).map_err(|_| SshCoreError::socks("domain name is not valid UTF-8"))?
        }
        other => return Err(SshCoreError::UnsupportedAddressType(other)),
    };

    let mut port = [0u8; 2];
    stream.read_exact(&mut port).await?;
    Ok(SocksTarget {
        host,
        port: u16::from_be_bytes(port),
    })
}

/// Write the fixed 10-byte reply, bound address `0.0.0.0:0`.
pub async fn write_reply<S>(stream: &mut S, reply: SocksReply) -> SshResult<()>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    let response = [SOCKS_VERSION, reply.code(), 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0];
    stream.write_all(&response).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "socks_tests.rs"]
mod tests;
