//! SecureTar stream encryption
//!
//! Protected backups encrypt the inner `homeassistant.tar.gz` as a whole with
//! AES-128-CBC. The key comes from the backup password, the IV from the key
//! and a random salt stored at the start of the stream.
//!
//! Stream layout:
//! - v1: `salt[16] || ciphertext` (PKCS#7 padded)
//! - v2: `b"SecureTar\x02" || 0[6] || plaintext_size: u64 BE || reserved[8] || salt[16] || ciphertext`

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

/// AES block size, also the key, IV and salt length
pub const BLOCK_SIZE: usize = 16;

/// Magic prefix of a v2 stream
pub const SECURETAR_MAGIC: [u8; 16] = *b"SecureTar\x02\x00\x00\x00\x00\x00\x00";

const KDF_ROUNDS: usize = 100;
const READ_CHUNK: usize = 64 * 1024;

/// Key derived from a backup password
pub type SecureTarKey = [u8; BLOCK_SIZE];

/// Derive the encryption key for a backup password
///
/// Same password, same key: existing protected backups stay readable.
pub fn password_to_key(password: &str) -> SecureTarKey {
    truncate(iterated_sha256(password.as_bytes()))
}

/// Derive the CBC IV from the key and the per-stream salt
fn generate_iv(key: &SecureTarKey, salt: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let mut seed = Vec::with_capacity(BLOCK_SIZE * 2);
    seed.extend_from_slice(key);
    seed.extend_from_slice(salt);
    truncate(iterated_sha256(&seed))
}

fn iterated_sha256(seed: &[u8]) -> Vec<u8> {
    (0..KDF_ROUNDS).fold(seed.to_vec(), |digest, _| Sha256::digest(&digest).to_vec())
}

fn truncate(digest: Vec<u8>) -> [u8; BLOCK_SIZE] {
    let mut out = [0u8; BLOCK_SIZE];
    out.copy_from_slice(&digest[..BLOCK_SIZE]);
    out
}

fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

/// Streaming decryptor for a SecureTar payload
///
/// The last decrypted block is held back until the end of the ciphertext is
/// seen, so padding can be removed without buffering the whole stream.
pub struct SecureTarReader<R> {
    inner: R,
    decryptor: Aes128CbcDec,
    /// Read buffer for the inner stream
    chunk: Box<[u8]>,
    /// Ciphertext not yet forming a whole block
    ciphertext: Vec<u8>,
    /// Decrypted bytes ready to hand out
    plaintext: Vec<u8>,
    position: usize,
    /// Last decrypted block, may carry padding
    held: Option<[u8; BLOCK_SIZE]>,
    /// Plaintext bytes still to return (v2 streams)
    remaining: Option<u64>,
    finished: bool,
}

impl<R: Read> SecureTarReader<R> {
    /// Read the stream header and prepare decryption
    pub fn new(mut inner: R, key: &SecureTarKey) -> io::Result<Self> {
        let mut salt = [0u8; BLOCK_SIZE];
        inner.read_exact(&mut salt)?;

        let mut remaining = None;
        if salt == SECURETAR_MAGIC {
            let mut size = [0u8; 8];
            inner.read_exact(&mut size)?;
            let mut reserved = [0u8; 8];
            inner.read_exact(&mut reserved)?;
            remaining = Some(u64::from_be_bytes(size));
            inner.read_exact(&mut salt)?;
        }

        let iv = generate_iv(key, &salt);
        let decryptor =
            Aes128CbcDec::new(GenericArray::from_slice(key), GenericArray::from_slice(&iv));

        Ok(Self {
            inner,
            decryptor,
            chunk: vec![0u8; READ_CHUNK].into_boxed_slice(),
            ciphertext: Vec::new(),
            plaintext: Vec::new(),
            position: 0,
            held: None,
            remaining,
            finished: false,
        })
    }

    /// Decrypt more data until plaintext is available or the stream ends
    fn fill(&mut self) -> io::Result<()> {
        self.plaintext.clear();
        self.position = 0;

        while self.plaintext.is_empty() && !self.finished {
            let n = self.inner.read(&mut self.chunk)?;
            if n == 0 {
                self.finish()?;
                break;
            }

            self.ciphertext.extend_from_slice(&self.chunk[..n]);
            let whole = self.ciphertext.len() / BLOCK_SIZE * BLOCK_SIZE;
            if whole == 0 {
                continue;
            }

            let mut blocks: Vec<u8> = self.ciphertext.drain(..whole).collect();
            for block in blocks.chunks_exact_mut(BLOCK_SIZE) {
                self.decryptor
                    .decrypt_block_mut(GenericArray::from_mut_slice(block));
            }

            if let Some(previous) = self.held.take() {
                self.plaintext.extend_from_slice(&previous);
            }
            let (body, last) = blocks.split_at(whole - BLOCK_SIZE);
            self.plaintext.extend_from_slice(body);
            let mut held = [0u8; BLOCK_SIZE];
            held.copy_from_slice(last);
            self.held = Some(held);
        }

        self.limit_to_declared_size();
        Ok(())
    }

    /// Handle the end of the ciphertext
    fn finish(&mut self) -> io::Result<()> {
        self.finished = true;

        if !self.ciphertext.is_empty() {
            return Err(invalid_data("truncated SecureTar stream"));
        }

        let Some(last) = self.held.take() else {
            return Ok(());
        };

        if let Some(remaining) = self.remaining {
            // Declared size decides where the plaintext ends
            self.plaintext.extend_from_slice(&last);
            if (self.plaintext.len() as u64) < remaining {
                return Err(invalid_data("truncated SecureTar stream"));
            }
            return Ok(());
        }

        let pad = usize::from(last[BLOCK_SIZE - 1]);
        let padding_valid = (1..=BLOCK_SIZE).contains(&pad)
            && last[BLOCK_SIZE - pad..].iter().all(|&b| usize::from(b) == pad);
        if !padding_valid {
            return Err(invalid_data("invalid SecureTar padding, wrong password?"));
        }
        self.plaintext.extend_from_slice(&last[..BLOCK_SIZE - pad]);
        Ok(())
    }

    fn limit_to_declared_size(&mut self) {
        if let Some(remaining) = self.remaining.as_mut() {
            let available = self.plaintext.len() as u64;
            if available > *remaining {
                // `remaining` is smaller than a buffered length, so it fits in usize
                self.plaintext.truncate(*remaining as usize);
            }
            *remaining -= self.plaintext.len() as u64;
            if *remaining == 0 {
                self.finished = true;
                self.held = None;
            }
        }
    }
}

impl<R: Read> Read for SecureTarReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.plaintext.len() {
            if self.finished {
                return Ok(0);
            }
            self.fill()?;
        }

        let available = &self.plaintext[self.position..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }
}

/// Streaming encryptor producing v1 SecureTar streams
///
/// The salt must be random per stream; it is written unencrypted first.
/// Call [`SecureTarWriter::finish`] to write the padding.
pub struct SecureTarWriter<W: Write> {
    inner: W,
    encryptor: Aes128CbcEnc,
    pending: Vec<u8>,
}

impl<W: Write> SecureTarWriter<W> {
    /// Write the salt and prepare encryption
    pub fn new(mut inner: W, key: &SecureTarKey, salt: [u8; BLOCK_SIZE]) -> io::Result<Self> {
        inner.write_all(&salt)?;
        let iv = generate_iv(key, &salt);
        let encryptor =
            Aes128CbcEnc::new(GenericArray::from_slice(key), GenericArray::from_slice(&iv));

        Ok(Self {
            inner,
            encryptor,
            pending: Vec::new(),
        })
    }

    fn encrypt_whole_blocks(&mut self) -> io::Result<()> {
        let whole = self.pending.len() / BLOCK_SIZE * BLOCK_SIZE;
        if whole == 0 {
            return Ok(());
        }
        let mut blocks: Vec<u8> = self.pending.drain(..whole).collect();
        for block in blocks.chunks_exact_mut(BLOCK_SIZE) {
            self.encryptor
                .encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        self.inner.write_all(&blocks)
    }

    /// Pad and encrypt the final block, returning the underlying writer
    pub fn finish(mut self) -> io::Result<W> {
        let pad = BLOCK_SIZE - self.pending.len() % BLOCK_SIZE;
        self.pending.extend(std::iter::repeat(pad as u8).take(pad));
        self.encrypt_whole_blocks()?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for SecureTarWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.encrypt_whole_blocks()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
