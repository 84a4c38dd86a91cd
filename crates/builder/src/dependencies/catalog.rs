//! Curated name to package tables

use std::collections::HashMap;
use std::sync::OnceLock;

/// A library the standard repositories do not (reliably) ship
#[derive(Debug, Clone, Copy)]
pub struct UnpackagedLibrary {
    pub name: &'static str,
    pub description: &'static str,
    pub header_only: bool,
    /// Package to install instead, when one exists after all
    pub package: Option<&'static str>,
    pub url: &'static str,
    pub install_instructions: Option<&'static str>,
    pub quick_install: &'static [&'static str],
    pub copr_repo: Option<&'static str>,
}

pub const UNPACKAGED_LIBRARIES: &[UnpackagedLibrary] = &[
    UnpackagedLibrary {
        name: "argagg",
        description: "A simple C++11 command line argument parser (header-only)",
        header_only: true,
        package: None,
        url: "https://github.com/vietjtnguyen/argagg",
        install_instructions: Some(
            "# argagg is a header-only library\n\
             git clone https://github.com/vietjtnguyen/argagg.git /tmp/argagg\n\
             sudo mkdir -p /usr/local/include/argagg\n\
             sudo cp /tmp/argagg/include/argagg/argagg.hpp /usr/local/include/argagg/\n\
             rm -rf /tmp/argagg",
        ),
        quick_install: &[
            "git clone --depth 1 https://github.com/vietjtnguyen/argagg.git /tmp/argagg",
            "sudo mkdir -p /usr/local/include/argagg",
            "sudo cp /tmp/argagg/include/argagg/argagg.hpp /usr/local/include/argagg/",
            "rm -rf /tmp/argagg",
        ],
        copr_repo: None,
    },
    UnpackagedLibrary {
        name: "nlohmann_json",
        description: "JSON for Modern C++ (header-only)",
        header_only: true,
        package: Some("json-devel"),
        url: "https://github.com/nlohmann/json",
        install_instructions: None,
        quick_install: &[],
        copr_repo: None,
    },
    UnpackagedLibrary {
        name: "catch2",
        description: "C++ test framework (header-only v2, compiled v3)",
        header_only: true,
        package: Some("catch-devel"),
        url: "https://github.com/catchorg/Catch2",
        install_instructions: None,
        quick_install: &[],
        copr_repo: None,
    },
    UnpackagedLibrary {
        name: "doctest",
        description: "C++ testing framework (header-only)",
        header_only: true,
        package: None,
        url: "https://github.com/doctest/doctest",
        install_instructions: Some(
            "# doctest is header-only\n\
             wget https://raw.githubusercontent.com/doctest/doctest/master/doctest/doctest.h\n\
             sudo mkdir -p /usr/local/include/doctest\n\
             sudo mv doctest.h /usr/local/include/doctest/",
        ),
        quick_install: &[
            "wget -q https://raw.githubusercontent.com/doctest/doctest/master/doctest/doctest.h -O /tmp/doctest.h",
            "sudo mkdir -p /usr/local/include/doctest",
            "sudo mv /tmp/doctest.h /usr/local/include/doctest/",
        ],
        copr_repo: None,
    },
    UnpackagedLibrary {
        name: "fmt",
        description: "Modern formatting library",
        header_only: false,
        package: Some("fmt-devel"),
        url: "https://github.com/fmtlib/fmt",
        install_instructions: None,
        quick_install: &[],
        copr_repo: None,
    },
    UnpackagedLibrary {
        name: "spdlog",
        description: "Fast C++ logging library",
        header_only: false,
        package: Some("spdlog-devel"),
        url: "https://github.com/gabime/spdlog",
        install_instructions: None,
        quick_install: &[],
        copr_repo: None,
    },
    UnpackagedLibrary {
        name: "rang",
        description: "Terminal colors for C++ (header-only)",
        header_only: true,
        package: None,
        url: "https://github.com/agauniyal/rang",
        install_instructions: Some(
            "# rang is header-only\n\
             wget https://raw.githubusercontent.com/agauniyal/rang/master/include/rang.hpp\n\
             sudo mv rang.hpp /usr/local/include/",
        ),
        quick_install: &[
            "wget -q https://raw.githubusercontent.com/agauniyal/rang/master/include/rang.hpp -O /tmp/rang.hpp",
            "sudo mv /tmp/rang.hpp /usr/local/include/",
        ],
        copr_repo: None,
    },
    UnpackagedLibrary {
        name: "cxxopts",
        description: "Lightweight C++ option parser (header-only)",
        header_only: true,
        package: Some("cxxopts-devel"),
        url: "https://github.com/jarro2783/cxxopts",
        install_instructions: Some(
            "# cxxopts is header-only\n\
             git clone --depth 1 https://github.com/jarro2783/cxxopts.git /tmp/cxxopts\n\
             sudo cp -r /tmp/cxxopts/include/cxxopts.hpp /usr/local/include/\n\
             rm -rf /tmp/cxxopts",
        ),
        quick_install: &[
            "git clone --depth 1 https://github.com/jarro2783/cxxopts.git /tmp/cxxopts",
            "sudo cp /tmp/cxxopts/include/cxxopts.hpp /usr/local/include/",
            "rm -rf /tmp/cxxopts",
        ],
        copr_repo: None,
    },
    UnpackagedLibrary {
        name: "indicators",
        description: "Activity indicators for C++ (header-only)",
        header_only: true,
        package: None,
        url: "https://github.com/p-ranav/indicators",
        install_instructions: Some(
            "# indicators is header-only\n\
             git clone --depth 1 https://github.com/p-ranav/indicators.git /tmp/indicators\n\
             sudo cp -r /tmp/indicators/include/indicators /usr/local/include/\n\
             rm -rf /tmp/indicators",
        ),
        quick_install: &[
            "git clone --depth 1 https://github.com/p-ranav/indicators.git /tmp/indicators",
            "sudo cp -r /tmp/indicators/include/indicators /usr/local/include/",
            "rm -rf /tmp/indicators",
        ],
        copr_repo: None,
    },
];

/// Lowercase dependency name to package; `None` means no package is needed
const PACKAGE_MAP: &[(&str, Option<&str>)] = &[
    // Graphics/GUI
    ("gtk", Some("gtk3-devel")),
    ("gtk2", Some("gtk2-devel")),
    ("gtk3", Some("gtk3-devel")),
    ("gtk4", Some("gtk4-devel")),
    ("gtk+-2.0", Some("gtk2-devel")),
    ("gtk+-3.0", Some("gtk3-devel")),
    ("qt", Some("qt5-qtbase-devel")),
    ("qt5", Some("qt5-qtbase-devel")),
    ("qt6", Some("qt6-qtbase-devel")),
    ("sdl", Some("SDL-devel")),
    ("sdl2", Some("SDL2-devel")),
    ("opengl", Some("mesa-libGL-devel")),
    ("glew", Some("glew-devel")),
    ("glut", Some("freeglut-devel")),
    ("vulkan", Some("vulkan-devel")),
    ("x11", Some("libX11-devel")),
    ("xext", Some("libXext-devel")),
    ("xrandr", Some("libXrandr-devel")),
    ("xcursor", Some("libXcursor-devel")),
    ("xi", Some("libXi-devel")),
    ("wayland", Some("wayland-devel")),
    // SVG
    ("librsvg", Some("librsvg2-devel")),
    ("librsvg-2.0", Some("librsvg2-devel")),
    ("rsvg", Some("librsvg2-devel")),
    ("rsvg-2.0", Some("librsvg2-devel")),
    ("gdk-pixbuf", Some("gdk-pixbuf2-devel")),
    ("gdk-pixbuf-2.0", Some("gdk-pixbuf2-devel")),
    // Audio
    ("alsa", Some("alsa-lib-devel")),
    ("pulseaudio", Some("pulseaudio-libs-devel")),
    ("openal", Some("openal-soft-devel")),
    ("portaudio", Some("portaudio-devel")),
    // Compression
    ("zlib", Some("zlib-devel")),
    ("bz2", Some("bzip2-devel")),
    ("bzip2", Some("bzip2-devel")),
    ("lzma", Some("xz-devel")),
    ("xz", Some("xz-devel")),
    ("lz4", Some("lz4-devel")),
    ("zstd", Some("libzstd-devel")),
    // Crypto
    ("openssl", Some("openssl-devel")),
    ("gnutls", Some("gnutls-devel")),
    ("libsodium", Some("libsodium-devel")),
    ("gcrypt", Some("libgcrypt-devel")),
    ("libgcrypt", Some("libgcrypt-devel")),
    ("gpg-error", Some("libgpg-error-devel")),
    ("libgpg-error", Some("libgpg-error-devel")),
    // Image
    ("png", Some("libpng-devel")),
    ("jpeg", Some("libjpeg-turbo-devel")),
    ("tiff", Some("libtiff-devel")),
    ("webp", Some("libwebp-devel")),
    ("gif", Some("giflib-devel")),
    // Text/XML
    ("xml2", Some("libxml2-devel")),
    ("libxml2", Some("libxml2-devel")),
    ("libxml-2.0", Some("libxml2-devel")),
    ("xslt", Some("libxslt-devel")),
    ("json-c", Some("json-c-devel")),
    ("yaml", Some("libyaml-devel")),
    ("expat", Some("expat-devel")),
    // Database
    ("sqlite", Some("sqlite-devel")),
    ("sqlite3", Some("sqlite-devel")),
    ("postgresql", Some("postgresql-devel")),
    ("mysql", Some("mariadb-connector-c-devel")),
    // Network
    ("curl", Some("libcurl-devel")),
    ("libcurl", Some("libcurl-devel")),
    ("ssh", Some("libssh-devel")),
    ("ssh2", Some("libssh2-devel")),
    ("libssh2", Some("libssh2-devel")),
    // Math
    ("fftw", Some("fftw-devel")),
    ("fftw3", Some("fftw-devel")),
    ("gsl", Some("gsl-devel")),
    ("lapack", Some("lapack-devel")),
    ("blas", Some("blas-devel")),
    // GLib (pkg-config names)
    ("glib", Some("glib2-devel")),
    ("glib-2.0", Some("glib2-devel")),
    ("gobject-2.0", Some("glib2-devel")),
    ("gio-2.0", Some("glib2-devel")),
    ("gmodule-2.0", Some("glib2-devel")),
    ("gthread-2.0", Some("glib2-devel")),
    // Misc
    ("python", Some("python3-devel")),
    ("python3", Some("python3-devel")),
    ("perl", Some("perl-devel")),
    ("lua", Some("lua-devel")),
    ("dbus", Some("dbus-devel")),
    ("dbus-1", Some("dbus-devel")),
    ("udev", Some("systemd-devel")),
    ("libudev", Some("systemd-devel")),
    ("pcre", Some("pcre-devel")),
    ("pcre2", Some("pcre2-devel")),
    ("readline", Some("readline-devel")),
    ("ncurses", Some("ncurses-devel")),
    ("freetype", Some("freetype-devel")),
    ("freetype2", Some("freetype-devel")),
    ("fontconfig", Some("fontconfig-devel")),
    ("cairo", Some("cairo-devel")),
    ("pango", Some("pango-devel")),
    ("harfbuzz", Some("harfbuzz-devel")),
    ("boost", Some("boost-devel")),
    ("eigen3", Some("eigen3-devel")),
    ("fuse", Some("fuse-devel")),
    ("fuse3", Some("fuse3-devel")),
    ("libarchive", Some("libarchive-devel")),
    ("squashfuse", Some("squashfuse-devel")),
    ("argp", Some("argp-standalone")),
    ("libappimage", Some("libappimage-devel")),
    ("squashfs", Some("squashfs-tools")),
    // Build tools
    ("aclocal", Some("automake")),
    ("automake", Some("automake")),
    ("autoconf", Some("autoconf")),
    ("autoreconf", Some("autoconf")),
    ("autoheader", Some("autoconf")),
    ("libtool", Some("libtool")),
    ("libtoolize", Some("libtool")),
    ("m4", Some("m4")),
    ("pkg-config", Some("pkgconf-pkg-config")),
    ("pkgconfig", Some("pkgconf-pkg-config")),
    ("gettext", Some("gettext-devel")),
    ("msgfmt", Some("gettext")),
    ("intltool", Some("intltool")),
    ("flex", Some("flex")),
    ("bison", Some("bison")),
    ("yacc", Some("bison")),
    ("nasm", Some("nasm")),
    ("yasm", Some("yasm")),
    ("patch", Some("patch")),
    ("sed", Some("sed")),
    ("make", Some("make")),
    ("xxd", Some("vim-common")),
    ("lupdate", Some("qt5-linguist")),
    // JSON (CMake find_package names)
    ("nlohmann_json", Some("json-devel")),
    ("nlohmann-json", Some("json-devel")),
    ("json", Some("json-devel")),
    ("rapidjson", Some("rapidjson-devel")),
    // CMake find_package names
    ("threads", None),
    ("x11_xpm", Some("libXpm-devel")),
    ("libxpm", Some("libXpm-devel")),
    ("xpm", Some("libXpm-devel")),
    // Qt5 modules
    ("qt5core", Some("qt5-qtbase-devel")),
    ("qt5gui", Some("qt5-qtbase-devel")),
    ("qt5widgets", Some("qt5-qtbase-devel")),
    ("qt5network", Some("qt5-qtbase-devel")),
    ("qt5quick", Some("qt5-qtdeclarative-devel")),
    ("qt5qml", Some("qt5-qtdeclarative-devel")),
    ("qt5quickcontrols2", Some("qt5-qtquickcontrols2-devel")),
    ("qt5svg", Some("qt5-qtsvg-devel")),
    ("qt5dbus", Some("qt5-qtbase-devel")),
    ("qt5xml", Some("qt5-qtbase-devel")),
    ("qt5concurrent", Some("qt5-qtbase-devel")),
    ("qt5printsupport", Some("qt5-qtbase-devel")),
    ("qt5opengl", Some("qt5-qtbase-devel")),
    ("qt5multimedia", Some("qt5-qtmultimedia-devel")),
    ("qt5webengine", Some("qt5-qtwebengine-devel")),
    ("qt5websockets", Some("qt5-qtwebsockets-devel")),
    ("qt5x11extras", Some("qt5-qtx11extras-devel")),
    ("qt5waylandclient", Some("qt5-qtwayland-devel")),
    // Qt6 modules
    ("qt6core", Some("qt6-qtbase-devel")),
    ("qt6gui", Some("qt6-qtbase-devel")),
    ("qt6widgets", Some("qt6-qtbase-devel")),
    ("qt6quick", Some("qt6-qtdeclarative-devel")),
    ("qt6qml", Some("qt6-qtdeclarative-devel")),
    ("qt6svg", Some("qt6-qtsvg-devel")),
];

fn package_map() -> &'static HashMap<&'static str, Option<&'static str>> {
    static MAP: OnceLock<HashMap<&'static str, Option<&'static str>>> = OnceLock::new();
    MAP.get_or_init(|| PACKAGE_MAP.iter().copied().collect())
}

/// Catalog entry for a known unpackaged library
pub(crate) fn unpackaged(name: &str) -> Option<&'static UnpackagedLibrary> {
    let lower = name.to_lowercase();
    UNPACKAGED_LIBRARIES.iter().find(|lib| lib.name == lower)
}

/// Map a dependency name to the package that provides it
///
/// Lookup order: the unpackaged catalog's replacement package, the curated
/// table, the table with a `lib` prefix removed, then added. Anything else
/// falls back to `<name>-devel`. `None` is returned only for names the table
/// marks as needing no package.
#[must_use]
pub fn map_dependency_to_package(name: &str) -> Option<String> {
    let clean = name.trim().trim_matches(['\'', '"']);
    let lower = clean.to_lowercase();

    if let Some(package) = unpackaged(&lower).and_then(|lib| lib.package) {
        return Some(package.to_string());
    }

    let map = package_map();
    if let Some(package) = map.get(lower.as_str()) {
        return package.map(str::to_string);
    }
    if let Some(stripped) = lower.strip_prefix("lib") {
        if let Some(package) = map.get(stripped) {
            return package.map(str::to_string);
        }
    }
    if let Some(package) = map.get(format!("lib{lower}").as_str()) {
        return package.map(str::to_string);
    }

    Some(format!("{clean}-devel"))
}
