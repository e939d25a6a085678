//! End-to-end scenarios covering fresh initialization, directory listing,
//! read/write/truncate round trips, renaming, remounting at a new base
//! address, and free-space accounting across create/destroy cycles. Backed
//! by real temp-file-mapped images rather than bare byte vectors, so the
//! remount scenario can actually exercise a base-address change.

use mmapfs::Fs;
use mmapfs_api::fs::{AllocatorSupport, AttrSupport, DirectorySupport, FileIoSupport, InodeSupport};
use mmapfs_api::image::MappedImage;
use std::fs::{create_dir_all, remove_dir_all};
use std::path::PathBuf;

fn disk_prep_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("scenario-images-".to_string() + name);
    create_dir_all(&path).unwrap();
    path.push("img");
    path
}

fn teardown(path: PathBuf) {
    remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn scenario_1_fresh_init_statfs() {
    let path = disk_prep_path("fresh-init");
    let mut image = MappedImage::create(&path, 4096).unwrap();
    let mut fs = unsafe { Fs::acquire(image.fsptr(), image.fssize()) }.unwrap();

    let stats = fs.statfs();
    assert_eq!(stats.block_size, 1024);
    assert!(stats.blocks >= 3);
    assert!(stats.blocks_free >= 2);
    assert_eq!(stats.name_max, 255);

    drop(fs);
    drop(image);
    teardown(path);
}

#[test]
fn scenario_2_create_and_list() {
    let path = disk_prep_path("create-list");
    let mut image = MappedImage::create(&path, 1 << 16).unwrap();
    let mut fs = unsafe { Fs::acquire(image.fsptr(), image.fssize()) }.unwrap();

    fs.mknod("/a").unwrap();
    fs.mknod("/b").unwrap();
    fs.mkdir("/c").unwrap();

    let mut names = fs.readdir("/").unwrap();
    names.sort();
    assert_eq!(names, vec!["a".to_string(), "b".to_string(), "c".to_string()]);

    drop(fs);
    drop(image);
    teardown(path);
}

#[test]
fn scenario_3_write_read_round_trip() {
    let path = disk_prep_path("write-read");
    let mut image = MappedImage::create(&path, 1 << 16).unwrap();
    let mut fs = unsafe { Fs::acquire(image.fsptr(), image.fssize()) }.unwrap();

    fs.mknod("/f").unwrap();
    let n = fs.write("/f", b"Hello, world!\n", 0).unwrap();
    assert_eq!(n, 14);
    assert_eq!(fs.getattr("/f").unwrap().size, 14);

    let mut buf = [0u8; 14];
    let r = fs.read("/f", &mut buf, 0).unwrap();
    assert_eq!(r, 14);
    assert_eq!(&buf, b"Hello, world!\n");

    drop(fs);
    drop(image);
    teardown(path);
}

#[test]
fn scenario_4_truncate_grow_zero_fills() {
    let path = disk_prep_path("truncate-grow");
    let mut image = MappedImage::create(&path, 1 << 16).unwrap();
    let mut fs = unsafe { Fs::acquire(image.fsptr(), image.fssize()) }.unwrap();

    fs.mknod("/z").unwrap();
    fs.truncate("/z", 8).unwrap();
    let mut buf = [0xffu8; 8];
    let r = fs.read("/z", &mut buf, 0).unwrap();
    assert_eq!(r, 8);
    assert_eq!(buf, [0u8; 8]);

    drop(fs);
    drop(image);
    teardown(path);
}

#[test]
fn scenario_5_rename_within_and_across_directories() {
    let path = disk_prep_path("rename");
    let mut image = MappedImage::create(&path, 1 << 16).unwrap();
    let mut fs = unsafe { Fs::acquire(image.fsptr(), image.fssize()) }.unwrap();

    fs.mkdir("/d1").unwrap();
    fs.mkdir("/d2").unwrap();
    fs.mknod("/d1/x").unwrap();
    fs.rename("/d1/x", "/d2/y").unwrap();

    assert!(fs.readdir("/d1").unwrap().is_empty());
    assert_eq!(fs.readdir("/d2").unwrap(), vec!["y".to_string()]);

    drop(fs);
    drop(image);
    teardown(path);
}

#[test]
fn scenario_6_remount_survives_at_a_new_base_address() {
    let path = disk_prep_path("remount");
    {
        let mut image = MappedImage::create(&path, 1 << 16).unwrap();
        let mut fs = unsafe { Fs::acquire(image.fsptr(), image.fssize()) }.unwrap();
        fs.mknod("/f").unwrap();
        fs.write("/f", b"Hello, world!\n", 0).unwrap();
        image.flush().unwrap();
        // Drop both: the mapping is torn down here, so a freshly re-opened
        // mapping is very unlikely to land at the same base address.
    }

    let mut image = MappedImage::open(&path).unwrap();
    let mut fs = unsafe { Fs::acquire(image.fsptr(), image.fssize()) }.unwrap();
    let mut buf = [0u8; 14];
    let r = fs.read("/f", &mut buf, 0).unwrap();
    assert_eq!(r, 14);
    assert_eq!(&buf, b"Hello, world!\n");

    drop(fs);
    drop(image);
    teardown(path);
}

#[test]
fn mknod_then_unlink_restores_free_totals() {
    let path = disk_prep_path("mknod-unlink-free");
    let mut image = MappedImage::create(&path, 1 << 16).unwrap();
    let mut fs = unsafe { Fs::acquire(image.fsptr(), image.fssize()) }.unwrap();

    let before = fs.total_free();
    fs.mknod("/tmp").unwrap();
    assert!(fs.total_free() < before);
    fs.unlink("/tmp").unwrap();
    assert_eq!(fs.total_free(), before);

    drop(fs);
    drop(image);
    teardown(path);
}

#[test]
fn mkdir_then_rmdir_restores_free_totals() {
    let path = disk_prep_path("mkdir-rmdir-free");
    let mut image = MappedImage::create(&path, 1 << 16).unwrap();
    let mut fs = unsafe { Fs::acquire(image.fsptr(), image.fssize()) }.unwrap();

    let before = fs.total_free();
    fs.mkdir("/tmp").unwrap();
    assert!(fs.total_free() < before);
    fs.rmdir("/tmp").unwrap();
    assert_eq!(fs.total_free(), before);

    drop(fs);
    drop(image);
    teardown(path);
}

#[test]
fn rename_onto_existing_target_overwrites_it() {
    let path = disk_prep_path("rename-overwrite");
    let mut image = MappedImage::create(&path, 1 << 16).unwrap();
    let mut fs = unsafe { Fs::acquire(image.fsptr(), image.fssize()) }.unwrap();

    fs.mknod("/a").unwrap();
    fs.write("/a", b"new", 0).unwrap();
    fs.mknod("/b").unwrap();
    fs.write("/b", b"stale-content-that-must-go", 0).unwrap();

    fs.rename("/a", "/b").unwrap();

    let names = fs.readdir("/").unwrap();
    assert_eq!(names, vec!["b".to_string()]);
    let mut buf = [0u8; 3];
    fs.read("/b", &mut buf, 0).unwrap();
    assert_eq!(&buf, b"new");

    drop(fs);
    drop(image);
    teardown(path);
}

#[test]
fn duplicate_mknod_is_rejected() {
    let path = disk_prep_path("dup-mknod");
    let mut image = MappedImage::create(&path, 1 << 16).unwrap();
    let mut fs = unsafe { Fs::acquire(image.fsptr(), image.fssize()) }.unwrap();

    fs.mknod("/a").unwrap();
    let err = fs.mknod("/a").unwrap_err();
    assert_eq!(err.errno(), mmapfs::error::errno::EEXIST);

    drop(fs);
    drop(image);
    teardown(path);
}

#[test]
fn rmdir_on_nonempty_directory_is_rejected() {
    let path = disk_prep_path("rmdir-nonempty");
    let mut image = MappedImage::create(&path, 1 << 16).unwrap();
    let mut fs = unsafe { Fs::acquire(image.fsptr(), image.fssize()) }.unwrap();

    fs.mkdir("/d").unwrap();
    fs.mknod("/d/x").unwrap();
    let err = fs.rmdir("/d").unwrap_err();
    assert_eq!(err.errno(), mmapfs::error::errno::ENOTEMPTY);

    drop(fs);
    drop(image);
    teardown(path);
}
