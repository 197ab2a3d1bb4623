//! 起動時にメモリへ展開済みのファイルシステムイメージ (read-only)
//!
//! レイアウト（4 KiB ブロック）
//! - ブロック0: エントリ数 / inode数 / データブロック数、予約52バイト、64バイトのエントリ×63
//! - ブロック1..=N: inode（長さ + データブロック番号の配列）
//! - 以降: データブロック

use crate::config::MAX_NAME_LEN;
use crate::error::{FsError, Result};

/// ブロックサイズ
pub const BLOCK_SIZE: usize = 4096;
/// ディレクトリエントリのサイズ
const DENTRY_SIZE: usize = 64;
/// ブートブロック内のエントリ開始位置
const DENTRY_OFFSET: usize = 64;
/// ブートブロックに入るエントリの最大数
pub const MAX_DENTRIES: usize = 63;
/// inode 1つが持てるデータブロック数
const BLOCKS_PER_INODE: usize = BLOCK_SIZE / 4 - 1;

/// ファイル種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// リアルタイムクロック
    Rtc,
    /// ディレクトリ
    Directory,
    /// 通常ファイル
    Regular,
}

impl FileType {
    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(FileType::Rtc),
            1 => Some(FileType::Directory),
            2 => Some(FileType::Regular),
            _ => None,
        }
    }
}

/// ディレクトリエントリ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dentry {
    name: [u8; MAX_NAME_LEN],
    /// 種別
    pub kind: FileType,
    /// inode番号（通常ファイルのみ意味を持つ）
    pub inode: u32,
}

impl Dentry {
    /// NUL終端を除いたファイル名
    pub fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_LEN);
        &self.name[..len]
    }
}

fn read_u32(image: &[u8], offset: usize) -> Option<u32> {
    let bytes = image.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// ファイルシステム
#[derive(Clone, Copy)]
pub struct BootFs<'a> {
    image: &'a [u8],
    dentry_count: usize,
    inode_count: usize,
    block_count: usize,
}

impl<'a> BootFs<'a> {
    /// イメージを検証してファイルシステムを作成
    pub fn new(image: &'a [u8]) -> Result<Self> {
        let dentry_count = read_u32(image, 0).ok_or(FsError::Corrupted)? as usize;
        let inode_count = read_u32(image, 4).ok_or(FsError::Corrupted)? as usize;
        let block_count = read_u32(image, 8).ok_or(FsError::Corrupted)? as usize;

        if dentry_count > MAX_DENTRIES {
            return Err(FsError::Corrupted.into());
        }
        let needed = (1 + inode_count + block_count) * BLOCK_SIZE;
        if image.len() < needed {
            return Err(FsError::Corrupted.into());
        }

        Ok(Self {
            image,
            dentry_count,
            inode_count,
            block_count,
        })
    }

    /// エントリ数
    pub fn len(&self) -> usize {
        self.dentry_count
    }

    /// エントリがないかどうか
    pub fn is_empty(&self) -> bool {
        self.dentry_count == 0
    }

    /// 名前でエントリを検索
    ///
    /// 32バイトを超える名前は一致しない
    pub fn lookup_by_name(&self, name: &[u8]) -> Result<Dentry> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(FsError::NotFound.into());
        }
        (0..self.dentry_count)
            .filter_map(|i| self.lookup_by_index(i).ok())
            .find(|d| d.name() == name)
            .ok_or(FsError::NotFound.into())
    }

    /// インデックスでエントリを取得
    pub fn lookup_by_index(&self, index: usize) -> Result<Dentry> {
        if index >= self.dentry_count {
            return Err(FsError::NotFound.into());
        }
        let off = DENTRY_OFFSET + index * DENTRY_SIZE;
        let raw_name = self
            .image
            .get(off..off + MAX_NAME_LEN)
            .ok_or(FsError::Corrupted)?;
        let mut name = [0u8; MAX_NAME_LEN];
        name.copy_from_slice(raw_name);

        let kind = read_u32(self.image, off + MAX_NAME_LEN)
            .and_then(FileType::from_raw)
            .ok_or(FsError::Corrupted)?;
        let inode = read_u32(self.image, off + MAX_NAME_LEN + 4).ok_or(FsError::Corrupted)?;

        Ok(Dentry { name, kind, inode })
    }

    /// ファイルサイズ
    pub fn size_of(&self, inode: u32) -> Result<u32> {
        let base = self.inode_offset(inode)?;
        Ok(read_u32(self.image, base).ok_or(FsError::Corrupted)?)
    }

    /// `offset`から`buf`へ読み込み、読んだバイト数を返す（終端では0）
    pub fn read(&self, inode: u32, offset: u32, buf: &mut [u8]) -> Result<usize> {
        let base = self.inode_offset(inode)?;
        let size = read_u32(self.image, base).ok_or(FsError::Corrupted)? as usize;
        let mut pos = offset as usize;
        if pos >= size {
            return Ok(0);
        }

        let end = size.min(pos + buf.len());
        let mut copied = 0;
        while pos < end {
            let slot = pos / BLOCK_SIZE;
            if slot >= BLOCKS_PER_INODE {
                return Err(FsError::Corrupted.into());
            }
            let block = read_u32(self.image, base + 4 + slot * 4).ok_or(FsError::Corrupted)? as usize;
            if block >= self.block_count {
                return Err(FsError::Corrupted.into());
            }

            let in_block = pos % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - in_block).min(end - pos);
            let src = (1 + self.inode_count + block) * BLOCK_SIZE + in_block;
            let data = self
                .image
                .get(src..src + chunk)
                .ok_or(FsError::Corrupted)?;
            buf[copied..copied + chunk].copy_from_slice(data);

            copied += chunk;
            pos += chunk;
        }
        Ok(copied)
    }

    fn inode_offset(&self, inode: u32) -> Result<usize> {
        let inode = inode as usize;
        if inode >= self.inode_count {
            return Err(FsError::NotFound.into());
        }
        Ok((1 + inode) * BLOCK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ImageBuilder;

    #[test]
    fn test_lookup_by_name_and_index() {
        let image = ImageBuilder::new()
            .directory(".")
            .rtc("rtc")
            .file("hello.txt", b"hello world")
            .build();
        let fs = BootFs::new(&image).unwrap();

        assert_eq!(fs.len(), 3);
        let d = fs.lookup_by_name(b"hello.txt").unwrap();
        assert_eq!(d.kind, FileType::Regular);
        assert_eq!(d.name(), b"hello.txt");
        assert_eq!(fs.lookup_by_index(1).unwrap().kind, FileType::Rtc);
        assert_eq!(
            fs.lookup_by_name(b"missing"),
            Err(FsError::NotFound.into())
        );
        assert!(fs.lookup_by_index(3).is_err());
    }

    #[test]
    fn test_long_names_never_match() {
        let long = "verylargetextwithverylongname.tx";
        assert_eq!(long.len(), 32);
        let image = ImageBuilder::new().file(long, b"x").build();
        let fs = BootFs::new(&image).unwrap();

        assert!(fs.lookup_by_name(long.as_bytes()).is_ok());
        assert!(fs.lookup_by_name(b"verylargetextwithverylongname.txt").is_err());
    }

    #[test]
    fn test_read_spans_blocks() {
        let data: std::vec::Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let image = ImageBuilder::new().file("big", &data).build();
        let fs = BootFs::new(&image).unwrap();
        let inode = fs.lookup_by_name(b"big").unwrap().inode;

        assert_eq!(fs.size_of(inode).unwrap(), 10_000);

        let mut buf = [0u8; 300];
        let n = fs.read(inode, 4000, &mut buf).unwrap();
        assert_eq!(n, 300);
        assert_eq!(&buf[..], &data[4000..4300]);

        let n = fs.read(inode, 9_900, &mut buf).unwrap();
        assert_eq!(n, 100);
        assert_eq!(fs.read(inode, 10_000, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_truncated_image_is_rejected() {
        let image = ImageBuilder::new().file("a", b"abc").build();
        assert!(BootFs::new(&image[..BLOCK_SIZE]).is_err());
        assert!(BootFs::new(&[0u8; 8]).is_err());
    }
}
