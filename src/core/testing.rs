//! テスト用のイメージ生成と起動済みカーネル

use crate::fs::BLOCK_SIZE;
use crate::hal::mock::MockHal;
use crate::kernel::Kernel;
use std::string::String;
use std::vec;
use std::vec::Vec;

/// ファイルシステムイメージを組み立てる
pub struct ImageBuilder {
    entries: Vec<(String, u32, Option<Vec<u8>>)>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn directory(mut self, name: &str) -> Self {
        self.entries.push((name.into(), 1, None));
        self
    }

    pub fn rtc(mut self, name: &str) -> Self {
        self.entries.push((name.into(), 0, None));
        self
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push((name.into(), 2, Some(data.to_vec())));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let files: Vec<&Vec<u8>> = self.entries.iter().filter_map(|e| e.2.as_ref()).collect();
        let inode_count = files.len();
        let block_count: usize = files
            .iter()
            .map(|d| (d.len() + BLOCK_SIZE - 1) / BLOCK_SIZE)
            .sum();

        let mut image = vec![0u8; (1 + inode_count + block_count) * BLOCK_SIZE];
        put_u32(&mut image, 0, self.entries.len() as u32);
        put_u32(&mut image, 4, inode_count as u32);
        put_u32(&mut image, 8, block_count as u32);

        let mut inode = 0usize;
        let mut next_block = 0usize;
        for (i, (name, kind, data)) in self.entries.iter().enumerate() {
            let off = 64 + i * 64;
            image[off..off + name.len()].copy_from_slice(name.as_bytes());
            put_u32(&mut image, off + 32, *kind);

            if let Some(data) = data {
                put_u32(&mut image, off + 36, inode as u32);
                let inode_base = (1 + inode) * BLOCK_SIZE;
                put_u32(&mut image, inode_base, data.len() as u32);
                for (slot, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
                    put_u32(&mut image, inode_base + 4 + slot * 4, next_block as u32);
                    let dst = (1 + inode_count + next_block) * BLOCK_SIZE;
                    image[dst..dst + chunk.len()].copy_from_slice(chunk);
                    next_block += 1;
                }
                inode += 1;
            }
        }
        image
    }
}

fn put_u32(image: &mut [u8], offset: usize, value: u32) {
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// エントリポイントと本体を持つ実行ファイルを作る
pub fn program(entry: u32, body: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; 40];
    bytes[..4].copy_from_slice(b"\x7fELF");
    bytes[24..28].copy_from_slice(&entry.to_le_bytes());
    bytes.extend_from_slice(body);
    bytes
}

/// シェル・プログラム・データファイルを含む標準イメージ
pub fn sample_image() -> Vec<u8> {
    ImageBuilder::new()
        .directory(".")
        .rtc("rtc")
        .file("shell", &program(0x0804_8100, b"shell body"))
        .file("ls", &program(0x0804_8200, b"ls body"))
        .file("counter", &program(0x0804_8300, b"counter body"))
        .file("frame0.txt", b"/\\/\\/\\ fish\n")
        .file("notexec", b"plain text, not a program")
        .build()
}

/// 起動して端末0のシェルを動かした状態のカーネル
pub fn booted(image: &[u8]) -> Kernel<'_, MockHal> {
    let mut kernel = Kernel::new(MockHal::new(), image).unwrap();
    kernel.start().unwrap();
    kernel
}
