pub mod analysis {
    pub mod deviationclassifier;
    pub mod routesegment;
    pub mod sectionanalyzer;
    pub mod statistics;
}

pub mod configuration;

pub mod engine;

pub mod error;

pub mod interpolation {
    pub mod interpolationbuilder;
    pub mod interpolationcache;
    pub mod interpolationfunction;
    pub mod valuecache;
}

pub mod math {
    pub mod curve {
        pub mod curve;
        pub mod hyperbola;
        pub mod point2d;
        pub mod polynomial;
    }
}

pub mod norm {
    pub mod normcurve;
    pub mod normpersistence;
    pub mod normpoint;
    pub mod normpointstore;
}
